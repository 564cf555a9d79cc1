//! Line codec for the request direction and plain-text replies.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{EngineError, Result};
use crate::protocol::{LINE_TERMINATOR, SENTINEL};

/// Codec turning command text into request bytes and reply bytes into text.
pub struct LineCodec;

impl LineCodec {
    /// Encode a command as a single request line.
    ///
    /// # Errors
    ///
    /// Rejects commands containing a line break or the reply sentinel, since
    /// either would split one request into two exchanges.
    pub fn encode(command: &str) -> Result<Bytes> {
        if command.trim().is_empty() {
            return Err(EngineError::InvalidCommand("empty command".into()));
        }
        if let Some(bad) = command
            .bytes()
            .find(|&b| b == LINE_TERMINATOR || b == b'\r' || b == SENTINEL)
        {
            return Err(EngineError::InvalidCommand(format!(
                "command contains control byte {bad:#04x}: {command:?}"
            )));
        }

        let mut line = BytesMut::with_capacity(command.len() + 1);
        line.put_slice(command.as_bytes());
        line.put_u8(LINE_TERMINATOR);
        Ok(line.freeze())
    }

    /// Decode reply bytes as text with trailing whitespace removed.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; engine output may quote
    /// arbitrary file contents.
    pub fn decode(reply: &[u8]) -> String {
        let text = String::from_utf8_lossy(reply);
        text.trim_end().to_string()
    }
}
