//! Bounded in-memory log of a session's traffic.
//!
//! Every command, non-blank output, engine stderr line and failure is mirrored
//! here in addition to `tracing`, so a front end can show the conversation with
//! the engine without installing a subscriber.
//!
//! # Example
//!
//! ```
//! use enginepipe::log::{LogKind, SessionLog};
//!
//! let log = SessionLog::with_capacity(2);
//! log.record(LogKind::Command, "s 0x100");
//! log.record(LogKind::Command, "?v .");
//! log.record(LogKind::Output, "0x100");
//!
//! let entries = log.entries();
//! assert_eq!(entries.len(), 2);
//! assert_eq!(entries[1].message, "0x100");
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tokio::sync::watch;

/// Default number of retained entries.
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Category of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    /// A command sent to the engine.
    Command,
    /// Text the engine replied with.
    Output,
    /// Lifecycle events.
    Info,
    /// Engine stderr lines.
    Warning,
    /// Failures.
    Error,
}

/// One recorded line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Wall-clock time of recording.
    pub timestamp: DateTime<Utc>,
    /// Category.
    pub kind: LogKind,
    /// Text.
    pub message: String,
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {:?}: {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.kind,
            self.message
        )
    }
}

struct Ring {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

/// Shared ring buffer of log entries. Cheap to clone.
#[derive(Clone)]
pub struct SessionLog {
    ring: Arc<Mutex<Ring>>,
    /// Total entries ever recorded; bumps on every record and clear.
    changes: Arc<watch::Sender<u64>>,
}

impl SessionLog {
    /// Create a log holding [`DEFAULT_LOG_CAPACITY`] entries.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    /// Create a log holding at most `capacity` entries (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (changes, _) = watch::channel(0);
        Self {
            ring: Arc::new(Mutex::new(Ring {
                entries: VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY)),
                capacity,
            })),
            changes: Arc::new(changes),
        }
    }

    /// Append an entry, evicting the oldest when full.
    pub fn record(&self, kind: LogKind, message: impl Into<String>) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            kind,
            message: message.into(),
        };
        {
            let mut ring = self.lock();
            if ring.entries.len() == ring.capacity {
                ring.entries.pop_front();
            }
            ring.entries.push_back(entry);
        }
        self.changes.send_modify(|n| *n += 1);
    }

    /// Snapshot of retained entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().entries.iter().cloned().collect()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.lock().entries.clear();
        self.changes.send_modify(|n| *n += 1);
    }

    /// Watch for changes. The value is a change counter, not the length.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Ring> {
        // A panic while holding the lock cannot leave the ring inconsistent.
        self.ring.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLog")
            .field("len", &self.len())
            .finish()
    }
}
