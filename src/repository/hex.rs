//! Raw byte access.

use tracing::debug;

use crate::cache::{BoxFuture, Source};
use crate::error::{EngineError, Result};
use crate::session::SessionHandle;

/// Reads and writes raw bytes of the open file.
#[derive(Debug, Clone)]
pub struct HexRepository {
    session: SessionHandle,
}

impl HexRepository {
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }

    /// Read up to `len` bytes at `addr`.
    ///
    /// Fewer bytes come back near the end of mapped data; none when nothing
    /// is mapped at `addr`.
    pub async fn read_bytes(&self, addr: u64, len: usize) -> Result<Vec<u8>> {
        let reply = self
            .session
            .execute_structured(&format!("px {len} @ {addr:#x}"))
            .await?;
        let bytes: Vec<u8> = reply.decode()?;
        if bytes.len() > len {
            return Err(EngineError::Protocol(format!(
                "asked for {len} bytes at {addr:#x}, got {}",
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    /// Overwrite bytes at `addr` with a hex string such as `"90 90"`.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidCommand`] unless the input holds an even,
    /// non-zero number of hex digits.
    pub async fn write_hex(&self, addr: u64, hex: &str) -> Result<String> {
        let digits = normalize_hex(hex)?;
        debug!(addr, len = digits.len() / 2, "Writing bytes");
        self.session
            .execute_text(&format!("wx {digits} @ {addr:#x}"))
            .await
    }

    /// Write `text` as a string at `addr`.
    pub async fn write_string(&self, addr: u64, text: &str) -> Result<String> {
        let escaped = escape_quoted(text);
        debug!(addr, len = text.len(), "Writing string");
        self.session
            .execute_text(&format!("w \"{escaped}\" @ {addr:#x}"))
            .await
    }
}

impl Source<u8> for HexRepository {
    fn fetch(&self, addr: u64, count: usize) -> BoxFuture<'_, Result<Vec<u8>>> {
        Box::pin(self.read_bytes(addr, count))
    }
}

/// Strip whitespace and check that only hex digit pairs remain.
fn normalize_hex(hex: &str) -> Result<String> {
    let digits: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.is_empty() {
        return Err(EngineError::InvalidCommand("no bytes to write".into()));
    }
    if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(EngineError::InvalidCommand(format!(
            "not a hex digit: {bad:?}"
        )));
    }
    if digits.len() % 2 != 0 {
        return Err(EngineError::InvalidCommand(format!(
            "odd number of hex digits: {digits}"
        )));
    }
    Ok(digits)
}

/// Escape backslashes and double quotes for a quoted engine argument.
pub(crate) fn escape_quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
