//! Frame buffer for accumulating partial reads of sentinel-terminated replies.
//!
//! Uses `bytes::BytesMut` so a completed reply is split off without copying.
//! The buffer remembers how far it has already scanned so a reply arriving in
//! many small reads is searched for the sentinel only once per byte.
//!
//! Bytes received after a sentinel belong to no outstanding request. They stay
//! in the buffer until [`FrameBuffer::discard`] is called before the next send.
//!
//! # Example
//!
//! ```ignore
//! use enginepipe::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//!
//! assert!(buffer.push(b"0x1").unwrap().is_none());
//! let reply = buffer.push(b"00\0").unwrap().unwrap();
//! assert_eq!(&reply[..], b"0x100");
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::{DEFAULT_MAX_REPLY_SIZE, SENTINEL};
use crate::error::{EngineError, Result};

/// Buffer for accumulating incoming bytes and extracting complete replies.
pub struct FrameBuffer {
    /// Accumulated bytes from pipe reads.
    buffer: BytesMut,
    /// Prefix of `buffer` already searched for the sentinel.
    scanned: usize,
    /// Maximum allowed reply size.
    max_reply_size: usize,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    ///
    /// Default capacity: 64KB, max reply: 256MB.
    pub fn new() -> Self {
        Self::with_max_reply(DEFAULT_MAX_REPLY_SIZE)
    }

    /// Create a new frame buffer with a custom max reply size.
    pub fn with_max_reply(max_reply_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            scanned: 0,
            max_reply_size,
        }
    }

    /// Push data into the buffer and extract the reply if it is now complete.
    ///
    /// Returns the reply bytes without the sentinel. Anything after the
    /// sentinel is retained as stale input.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the pending reply exceeds the maximum size
    /// without a sentinel.
    pub fn push(&mut self, data: &[u8]) -> Result<Option<Bytes>> {
        self.buffer.extend_from_slice(data);
        self.try_extract()
    }

    /// Try to extract a complete reply from what is already buffered.
    pub fn try_extract(&mut self) -> Result<Option<Bytes>> {
        match find_sentinel(&self.buffer[self.scanned..]) {
            Some(offset) => {
                let end = self.scanned + offset;
                let reply = self.buffer.split_to(end).freeze();
                // Drop the sentinel itself.
                let _ = self.buffer.split_to(1);
                self.scanned = 0;
                Ok(Some(reply))
            }
            None => {
                self.scanned = self.buffer.len();
                if self.buffer.len() > self.max_reply_size {
                    return Err(EngineError::Protocol(format!(
                        "Reply size {} exceeds maximum {} without sentinel",
                        self.buffer.len(),
                        self.max_reply_size
                    )));
                }
                Ok(None)
            }
        }
    }

    /// Take whatever was received for an unterminated reply.
    ///
    /// Used when the stream ends before the sentinel arrives.
    pub fn take_partial(&mut self) -> Bytes {
        self.scanned = 0;
        self.buffer.split().freeze()
    }

    /// Drop all buffered bytes, returning how many were dropped.
    pub fn discard(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.clear();
        self.scanned = 0;
        dropped
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn find_sentinel(haystack: &[u8]) -> Option<usize> {
    haystack.iter().position(|&b| b == SENTINEL)
}
