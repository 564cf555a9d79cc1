//! Dedicated exchange task owning both pipe ends.
//!
//! Callers never touch the pipes. Each request travels through an mpsc channel
//! to one task that performs the whole exchange (resync, write, read until the
//! sentinel) before taking the next request, so order is FIFO and at most one
//! exchange is ever in flight.
//!
//! # Architecture
//!
//! ```text
//! Caller 1 ─┐
//! Caller 2 ─┼─► mpsc::Sender<Request> ─► Exchange Task ─► stdin
//! Caller N ─┘         ▲                        │
//!                     └──── oneshot reply ◄────┴──── stdout
//! ```

use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, warn};

use crate::codec::LineCodec;
use crate::error::{EngineError, Result, Termination};
use crate::log::{LogKind, SessionLog};
use crate::protocol::{FrameBuffer, LINE_TERMINATOR, QUIT_COMMAND};
use crate::session::SessionPhase;

/// Size of a single pipe read.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Work item for the exchange task.
pub(crate) enum Request {
    /// Send one command and deliver its reply.
    Exchange {
        /// Command text, for logging.
        command: String,
        /// Encoded request line.
        line: Bytes,
        /// Where the reply goes. A closed receiver means the caller gave up.
        reply: oneshot::Sender<Result<String>>,
    },
    /// Send the quit command and stop.
    Shutdown {
        /// Signalled once the quit line was written (or could not be).
        done: oneshot::Sender<()>,
    },
}

/// Settings the exchange task needs.
#[derive(Debug, Clone)]
pub(crate) struct ExchangeConfig {
    pub read_timeout: Option<Duration>,
    pub max_reply_size: usize,
}

/// Shared lifecycle state. First termination wins.
pub(crate) type PhaseCell = Arc<watch::Sender<SessionPhase>>;

/// Move the session to `Terminated`, unless it already is.
///
/// Returns the termination actually in effect.
pub(crate) fn terminate(phase: &PhaseCell, cause: Termination) -> Termination {
    let mut effective = cause.clone();
    phase.send_if_modified(|current| match current {
        SessionPhase::Terminated(existing) => {
            effective = existing.clone();
            false
        }
        _ => {
            *current = SessionPhase::Terminated(cause.clone());
            true
        }
    });
    effective
}

/// The termination in effect, if any.
pub(crate) fn termination(phase: &PhaseCell) -> Option<Termination> {
    match &*phase.borrow() {
        SessionPhase::Terminated(cause) => Some(cause.clone()),
        _ => None,
    }
}

/// Result of one exchange.
enum Outcome {
    /// Sentinel seen; the session stays usable.
    Complete(String),
    /// Stream ended after some output but before the sentinel.
    Truncated(String),
    /// Nothing usable; the session is dead for this reason.
    Failed(Termination),
}

/// Spawn the exchange task.
pub(crate) fn spawn_exchange_task<R, W>(
    reader: R,
    writer: W,
    rx: mpsc::Receiver<Request>,
    phase: PhaseCell,
    log: SessionLog,
    config: ExchangeConfig,
) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(exchange_loop(reader, writer, rx, phase, log, config))
}

async fn exchange_loop<R, W>(
    mut reader: R,
    mut writer: W,
    mut rx: mpsc::Receiver<Request>,
    phase: PhaseCell,
    log: SessionLog,
    config: ExchangeConfig,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut frames = FrameBuffer::with_max_reply(config.max_reply_size);
    let mut read_buf = vec![0u8; READ_CHUNK_SIZE];

    while let Some(request) = rx.recv().await {
        match request {
            Request::Shutdown { done } => {
                send_quit(&mut writer).await;
                terminate(&phase, Termination::Closed);
                let _ = done.send(());
                break;
            }
            Request::Exchange {
                command,
                line,
                reply,
            } => {
                if let Some(cause) = termination(&phase) {
                    let _ = reply.send(Err(cause.to_error()));
                    break;
                }
                if reply.is_closed() {
                    debug!(%command, "Skipping command abandoned while queued");
                    continue;
                }

                debug!(%command, "Executing engine command");
                log.record(LogKind::Command, command.as_str());

                let outcome = run_exchange(
                    &mut reader,
                    &mut writer,
                    &mut frames,
                    &mut read_buf,
                    &line,
                    config.read_timeout,
                )
                .await;

                match outcome {
                    Outcome::Complete(text) => {
                        if !text.trim().is_empty() {
                            log.record(LogKind::Output, text.as_str());
                        }
                        let _ = reply.send(Ok(text));
                    }
                    Outcome::Truncated(text) => {
                        let cause = terminate(&phase, Termination::Eof);
                        warn!(%command, "Engine exited mid-reply, returning partial output");
                        log.record(LogKind::Output, text.as_str());
                        log.record(LogKind::Error, format!("Engine terminated: {cause:?}"));
                        let _ = reply.send(Ok(text));
                        break;
                    }
                    Outcome::Failed(cause) => {
                        let cause = terminate(&phase, cause);
                        error!(%command, ?cause, "Engine session terminated");
                        log.record(LogKind::Error, format!("{command}: {}", cause.to_error()));
                        let _ = reply.send(Err(cause.to_error()));
                        break;
                    }
                }
            }
        }
    }

    // Everything still queued learns why the session is gone.
    rx.close();
    let cause = termination(&phase).unwrap_or(Termination::Closed);
    while let Some(request) = rx.recv().await {
        match request {
            Request::Exchange { reply, .. } => {
                let _ = reply.send(Err(cause.to_error()));
            }
            Request::Shutdown { done } => {
                send_quit(&mut writer).await;
                let _ = done.send(());
            }
        }
    }
    debug!("Exchange task finished");
}

/// Perform one complete exchange on a clean pipe.
async fn run_exchange<R, W>(
    reader: &mut R,
    writer: &mut W,
    frames: &mut FrameBuffer,
    read_buf: &mut [u8],
    line: &[u8],
    read_timeout: Option<Duration>,
) -> Outcome
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match resync(reader, frames, read_buf).await {
        Ok(Resync::Clean) => {}
        Ok(Resync::Eof) => return Outcome::Failed(Termination::Eof),
        Err(e) => return Outcome::Failed(Termination::Io(e.to_string())),
    }

    if let Err(e) = write_line(writer, line).await {
        return Outcome::Failed(Termination::Io(format!("write failed: {e}")));
    }

    let read = read_reply(reader, frames, read_buf);
    match read_timeout {
        Some(limit) => match tokio::time::timeout(limit, read).await {
            Ok(outcome) => outcome,
            Err(_) => Outcome::Failed(Termination::Timeout(limit)),
        },
        None => read.await,
    }
}

enum Resync {
    Clean,
    Eof,
}

/// Discard everything that can be read without blocking.
///
/// Covers both leftovers already buffered after a previous sentinel and bytes
/// the engine wrote on its own since then.
async fn resync<R>(reader: &mut R, frames: &mut FrameBuffer, buf: &mut [u8]) -> std::io::Result<Resync>
where
    R: AsyncRead + Unpin,
{
    let mut dropped = frames.discard();

    loop {
        let ready = poll_fn(|cx| {
            let mut read_buf = ReadBuf::new(&mut *buf);
            match Pin::new(&mut *reader).poll_read(cx, &mut read_buf) {
                Poll::Ready(Ok(())) => Poll::Ready(Some(Ok(read_buf.filled().len()))),
                Poll::Ready(Err(e)) => Poll::Ready(Some(Err(e))),
                Poll::Pending => Poll::Ready(None),
            }
        })
        .await;

        match ready {
            None => break,
            Some(Ok(0)) => return Ok(Resync::Eof),
            Some(Ok(n)) => dropped += n,
            Some(Err(e)) => return Err(e),
        }
    }

    if dropped > 0 {
        warn!(bytes = dropped, "Discarded stale engine output before send");
    }
    Ok(Resync::Clean)
}

async fn write_line<W>(writer: &mut W, line: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line).await?;
    writer.flush().await
}

/// Read until the sentinel, EOF, or a framing violation.
async fn read_reply<R>(reader: &mut R, frames: &mut FrameBuffer, buf: &mut [u8]) -> Outcome
where
    R: AsyncRead + Unpin,
{
    loop {
        let n = match reader.read(buf).await {
            Ok(n) => n,
            Err(e) => return Outcome::Failed(Termination::Io(format!("read failed: {e}"))),
        };

        if n == 0 {
            let partial = frames.take_partial();
            if partial.is_empty() {
                return Outcome::Failed(Termination::Eof);
            }
            return Outcome::Truncated(LineCodec::decode(&partial));
        }

        match frames.push(&buf[..n]) {
            Ok(Some(reply)) => return Outcome::Complete(LineCodec::decode(&reply)),
            Ok(None) => continue,
            Err(EngineError::Protocol(msg)) => return Outcome::Failed(Termination::Protocol(msg)),
            Err(other) => return Outcome::Failed(Termination::Protocol(other.to_string())),
        }
    }
}

/// Best effort: ask the engine to exit and close its input.
async fn send_quit<W>(writer: &mut W)
where
    W: AsyncWrite + Unpin,
{
    let mut line = Vec::with_capacity(QUIT_COMMAND.len() + 1);
    line.extend_from_slice(QUIT_COMMAND.as_bytes());
    line.push(LINE_TERMINATOR);

    if let Err(e) = write_line(writer, &line).await {
        debug!(error = %e, "Quit command not delivered");
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase_cell() -> PhaseCell {
        let (tx, _) = watch::channel(SessionPhase::Running);
        Arc::new(tx)
    }

    #[test]
    fn test_first_termination_wins() {
        let phase = phase_cell();

        assert_eq!(terminate(&phase, Termination::Eof), Termination::Eof);
        assert_eq!(
            terminate(&phase, Termination::Io("late".into())),
            Termination::Eof
        );
        assert_eq!(termination(&phase), Some(Termination::Eof));
    }

    #[tokio::test]
    async fn test_resync_drains_ready_bytes_without_blocking() {
        let (mut engine, mut client) = tokio::io::duplex(1024);
        engine.write_all(b"junk\0more junk").await.unwrap();

        let mut frames = FrameBuffer::new();
        frames.push(b"old\0left").unwrap();
        let mut buf = vec![0u8; 16];

        let outcome = resync(&mut client, &mut frames, &mut buf).await.unwrap();
        assert!(matches!(outcome, Resync::Clean));
        assert!(frames.is_empty());

        engine.write_all(b"fresh\0").await.unwrap();
        let reply = read_reply(&mut client, &mut frames, &mut buf).await;
        assert!(matches!(reply, Outcome::Complete(text) if text == "fresh"));
    }

    #[tokio::test]
    async fn test_resync_detects_eof() {
        let (engine, mut client) = tokio::io::duplex(64);
        drop(engine);

        let mut frames = FrameBuffer::new();
        let mut buf = vec![0u8; 16];
        let outcome = resync(&mut client, &mut frames, &mut buf).await.unwrap();
        assert!(matches!(outcome, Resync::Eof));
    }

    #[tokio::test]
    async fn test_read_reply_partial_on_eof() {
        let (mut engine, mut client) = tokio::io::duplex(64);
        engine.write_all(b"half a rep").await.unwrap();
        drop(engine);

        let mut frames = FrameBuffer::new();
        let mut buf = vec![0u8; 4];
        let outcome = read_reply(&mut client, &mut frames, &mut buf).await;
        assert!(matches!(outcome, Outcome::Truncated(text) if text == "half a rep"));
    }

    #[tokio::test]
    async fn test_read_reply_oversized_is_protocol_failure() {
        let (mut engine, mut client) = tokio::io::duplex(64);
        engine.write_all(b"0123456789").await.unwrap();

        let mut frames = FrameBuffer::with_max_reply(4);
        let mut buf = vec![0u8; 16];
        let outcome = read_reply(&mut client, &mut frames, &mut buf).await;
        assert!(matches!(outcome, Outcome::Failed(Termination::Protocol(_))));
    }
}
