//! # enginepipe
//!
//! Drive a long-lived analysis engine process over its quiet pipe protocol
//! and page through the file it has open with windowed caches.
//!
//! ## Architecture
//!
//! - **Transport**: one engine child process per [`Session`], commands written
//!   as lines to its stdin, replies read from its stdout up to a `0x00`
//!   sentinel. A single exchange task keeps exactly one command on the wire.
//! - **Repositories**: typed queries (bytes, instructions, references,
//!   sections) built on [`SessionHandle`].
//! - **Cache**: [`WindowedCache`](cache::WindowedCache) keeps only the chunks
//!   around what is being viewed and loads the rest on demand.
//!
//! ## Example
//!
//! ```ignore
//! use enginepipe::{Browser, Session};
//!
//! #[tokio::main]
//! async fn main() -> enginepipe::Result<()> {
//!     let session = Session::builder("/data/engine")
//!         .file("/tmp/target.bin")
//!         .open()
//!         .await?;
//!
//!     let browser = Browser::open(session.handle(), None).await?;
//!     let cursor = browser.initial_cursor();
//!     browser.bytes().ensure_loaded(cursor).await?;
//!     println!("{:02x?}", browser.bytes().read(cursor, 16));
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod codec;
pub mod error;
pub mod log;
pub mod protocol;
pub mod repository;
pub mod transport;

mod browser;
mod exchange;
mod session;

#[cfg(test)]
mod test_support;

pub use browser::{Browser, BYTE_CHUNK_SIZE, INSTRUCTION_CHUNK_SIZE};
pub use error::{EngineError, Result, Termination};
pub use log::{LogEntry, LogKind, SessionLog};
pub use protocol::{Command, ReplyMode, StructuredReply};
pub use session::{
    Session, SessionBuilder, SessionConfig, SessionHandle, SessionPhase, TransportOptions,
    DEFAULT_QUEUE_CAPACITY, DEFAULT_QUIT_GRACE,
};
