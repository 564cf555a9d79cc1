//! Error types for enginepipe.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all session, repository and cache operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine binary is missing, unrunnable, or exited right after spawn.
    #[error("Failed to start engine process: {0}")]
    ProcessStart(String),

    /// I/O error writing or reading the pipe mid-session. The session is dead.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The engine closed its output stream.
    #[error("Engine process terminated (EOF)")]
    EofTerminated,

    /// The session was closed explicitly.
    #[error("Session closed")]
    Closed,

    /// No reply arrived within the configured read timeout. The session is dead.
    #[error("Transport failure: no reply within {0:?}")]
    Timeout(Duration),

    /// Command rejected before it reached the pipe.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Reply could not be interpreted.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A cache load failed. The cache itself is untouched.
    #[error("Fetch of {count} items at {addr:#x} failed: {source}")]
    Fetch {
        /// First address of the failed window.
        addr: u64,
        /// Number of items requested.
        count: usize,
        /// Underlying repository or transport error.
        #[source]
        source: Box<EngineError>,
    },

    /// Address outside the cache's virtual address range.
    #[error("Address {addr:#x} outside [{start:#x}, {end:#x})")]
    OutOfRange {
        /// Requested address.
        addr: u64,
        /// Range start (inclusive).
        start: u64,
        /// Range end (exclusive).
        end: u64,
    },

    /// Range whose end precedes its start.
    #[error("Invalid address range [{start:#x}, {end:#x})")]
    InvalidRange {
        /// Range start.
        start: u64,
        /// Range end.
        end: u64,
    },

    /// JSON decode error in a structured reply.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error outside an established session (setup, directories).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Wrap a repository error as a cache fetch failure.
    pub(crate) fn fetch(addr: u64, count: usize, source: EngineError) -> Self {
        Self::Fetch {
            addr,
            count,
            source: Box::new(source),
        }
    }

    /// Whether this error means the session can no longer execute commands.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Transport(_) | Self::EofTerminated | Self::Closed | Self::Timeout(_) => true,
            Self::Fetch { source, .. } => source.is_terminal(),
            _ => false,
        }
    }
}

/// Why a session stopped accepting commands.
///
/// Kept separate from [`EngineError`] because it must be cloned out to every
/// caller still waiting on the dead session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The engine closed its output stream.
    Eof,
    /// Write or read on the pipe failed.
    Io(String),
    /// Reply framing was violated beyond recovery.
    Protocol(String),
    /// No reply within the read timeout.
    Timeout(Duration),
    /// Closed by the owner.
    Closed,
}

impl Termination {
    /// The error surfaced to callers of a session terminated for this reason.
    pub fn to_error(&self) -> EngineError {
        match self {
            Self::Eof => EngineError::EofTerminated,
            Self::Io(msg) => EngineError::Transport(msg.clone()),
            Self::Protocol(msg) => EngineError::Transport(format!("reply framing lost: {msg}")),
            Self::Timeout(after) => EngineError::Timeout(*after),
            Self::Closed => EngineError::Closed,
        }
    }
}

/// Result type alias using EngineError.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_termination_maps_to_transport_errors() {
        assert!(matches!(Termination::Eof.to_error(), EngineError::EofTerminated));
        assert!(matches!(
            Termination::Io("broken pipe".into()).to_error(),
            EngineError::Transport(msg) if msg == "broken pipe"
        ));
        assert!(matches!(
            Termination::Protocol("too large".into()).to_error(),
            EngineError::Transport(_)
        ));
        assert!(matches!(Termination::Closed.to_error(), EngineError::Closed));
    }

    #[test]
    fn test_terminal_classification() {
        assert!(EngineError::EofTerminated.is_terminal());
        assert!(EngineError::Timeout(Duration::from_secs(1)).is_terminal());
        assert!(!EngineError::InvalidCommand("x".into()).is_terminal());
        assert!(!EngineError::Protocol("x".into()).is_terminal());

        let wrapped = EngineError::fetch(0x10, 4, EngineError::Closed);
        assert!(wrapped.is_terminal());
        let wrapped = EngineError::fetch(0x10, 4, EngineError::Protocol("bad".into()));
        assert!(!wrapped.is_terminal());
    }

    #[test]
    fn test_display_formats_addresses_as_hex() {
        let err = EngineError::OutOfRange {
            addr: 0x2000,
            start: 0,
            end: 0x1000,
        };
        assert_eq!(err.to_string(), "Address 0x2000 outside [0x0, 0x1000)");
    }
}
