//! In-process stand-in engine for unit tests.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::protocol::{QUIT_COMMAND, SENTINEL};
use crate::session::{Session, TransportOptions};

/// Session whose engine answers each command line with `respond`.
///
/// `Some(text)` is sent back followed by the sentinel; `None` makes the
/// engine exit without replying.
pub(crate) fn fake_session<F>(respond: F) -> Session
where
    F: FnMut(&str) -> Option<String> + Send + 'static,
{
    fake_session_with(TransportOptions::default(), respond)
}

pub(crate) fn fake_session_with<F>(options: TransportOptions, mut respond: F) -> Session
where
    F: FnMut(&str) -> Option<String> + Send + 'static,
{
    let (client, engine_side) = tokio::io::duplex(64 * 1024);
    let (client_read, client_write) = tokio::io::split(client);
    let (engine_read, mut engine_write) = tokio::io::split(engine_side);

    tokio::spawn(async move {
        let mut lines = BufReader::new(engine_read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line == QUIT_COMMAND {
                break;
            }
            let Some(reply) = respond(&line) else {
                break;
            };
            let mut frame = reply.into_bytes();
            frame.push(SENTINEL);
            if engine_write.write_all(&frame).await.is_err() {
                break;
            }
        }
    });

    Session::from_streams(client_read, client_write, options)
}
