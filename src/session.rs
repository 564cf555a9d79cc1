//! Session builder, lifecycle and the cloneable execution handle.
//!
//! A [`Session`] owns one engine process. It is created explicitly, handed
//! around as cheap [`SessionHandle`] clones, and closed explicitly. There is no
//! process-wide instance.
//!
//! Lifecycle: `Starting → Running → Terminated`. `Terminated` is absorbing; once
//! the engine hits EOF, an I/O error, a read timeout or [`Session::close`],
//! every later command fails fast with the same error and nothing more is
//! written to the pipe.
//!
//! # Example
//!
//! ```ignore
//! use enginepipe::Session;
//!
//! #[tokio::main]
//! async fn main() -> enginepipe::Result<()> {
//!     let session = Session::builder("/data/app/engine")
//!         .file("/sdcard/target.bin")
//!         .open()
//!         .await?;
//!
//!     let engine = session.handle();
//!     engine.execute_text("s 0x100").await?;
//!     assert_eq!(engine.execute_text("?v .").await?, "0x100");
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codec::LineCodec;
use crate::error::{EngineError, Result, Termination};
use crate::exchange::{spawn_exchange_task, terminate, termination, ExchangeConfig, PhaseCell, Request};
use crate::log::{LogKind, SessionLog, DEFAULT_LOG_CAPACITY};
use crate::protocol::{Command, StructuredReply, DEFAULT_MAX_REPLY_SIZE};
use crate::transport::{spawn_engine, spawn_stderr_drain, EngineLayout};

/// Default wait for the engine to exit after the quit command.
pub const DEFAULT_QUIT_GRACE: Duration = Duration::from_millis(200);

/// Default number of commands that may wait for the exchange task.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Lifecycle state of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// Process spawned, streams not yet wired.
    Starting,
    /// Accepting commands.
    Running,
    /// Dead for the given reason. Absorbing.
    Terminated(Termination),
}

impl SessionPhase {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated(_))
    }
}

/// Settings for the request/reply channel, independent of how the streams
/// were obtained.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Deadline for a reply once the command is written. `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Largest reply accepted before the session is declared desynchronized.
    pub max_reply_size: usize,
    /// Commands that may queue behind the one in flight.
    pub queue_capacity: usize,
    /// Entries kept by the session log.
    pub log_capacity: usize,
    /// Wait after the quit command before killing the engine.
    pub quit_grace: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            read_timeout: None,
            max_reply_size: DEFAULT_MAX_REPLY_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            log_capacity: DEFAULT_LOG_CAPACITY,
            quit_grace: DEFAULT_QUIT_GRACE,
        }
    }
}

/// Everything needed to start an engine session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Private storage layout.
    pub layout: EngineLayout,
    /// Executable to run. Defaults to `<root>/bin/r2`.
    pub program: PathBuf,
    /// Arguments placed before the engine's own (for wrapper launchers).
    pub leading_args: Vec<OsString>,
    /// File to open. `None` starts a blank session.
    pub file: Option<PathBuf>,
    /// Extra open flags placed before the file argument.
    pub open_flags: Vec<String>,
    /// Open the file writable.
    pub writable: bool,
    /// Additional environment, applied after the engine defaults.
    pub env: Vec<(OsString, OsString)>,
    /// Channel settings.
    pub transport: TransportOptions,
}

impl SessionConfig {
    /// Defaults for an engine installed under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let layout = EngineLayout::new(root);
        Self {
            program: layout.engine_binary(),
            layout,
            leading_args: Vec::new(),
            file: None,
            open_flags: Vec::new(),
            writable: false,
            env: Vec::new(),
            transport: TransportOptions::default(),
        }
    }
}

/// Builder for configuring and opening a [`Session`].
pub struct SessionBuilder {
    config: SessionConfig,
}

impl SessionBuilder {
    /// Create a builder for an engine installed under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            config: SessionConfig::new(root),
        }
    }

    /// Use a different executable.
    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.program = program.into();
        self
    }

    /// Add an argument before the engine arguments.
    pub fn leading_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.config.leading_args.push(arg.into());
        self
    }

    /// Bind the session to a file.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.file = Some(path.into());
        self
    }

    /// Add an open flag.
    pub fn open_flag(mut self, flag: impl Into<String>) -> Self {
        self.config.open_flags.push(flag.into());
        self
    }

    /// Open the bound file writable.
    pub fn writable(mut self, writable: bool) -> Self {
        self.config.writable = writable;
        self
    }

    /// Set an extra environment variable.
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.config.env.push((key.into(), value.into()));
        self
    }

    /// Fail and terminate the session when a reply takes longer than `limit`.
    pub fn read_timeout(mut self, limit: Duration) -> Self {
        self.config.transport.read_timeout = Some(limit);
        self
    }

    /// Wait after the quit command before killing the engine.
    pub fn quit_grace(mut self, grace: Duration) -> Self {
        self.config.transport.quit_grace = grace;
        self
    }

    /// Bound the number of queued commands.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.transport.queue_capacity = capacity.max(1);
        self
    }

    /// Largest accepted reply.
    pub fn max_reply_size(mut self, size: usize) -> Self {
        self.config.transport.max_reply_size = size;
        self
    }

    /// Entries kept by the session log.
    pub fn log_capacity(mut self, capacity: usize) -> Self {
        self.config.transport.log_capacity = capacity;
        self
    }

    /// The configuration built so far.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Spawn the engine and start the session.
    pub async fn open(self) -> Result<Session> {
        Session::open(self.config).await
    }
}

/// An open engine session. Owns the process and the background tasks.
///
/// Dropping a session kills the engine; prefer [`Session::close`].
pub struct Session {
    handle: SessionHandle,
    child: Option<Child>,
    exchange_task: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<()>>,
    file: Option<PathBuf>,
    quit_grace: Duration,
}

impl Session {
    /// Create a new session builder.
    pub fn builder(root: impl Into<PathBuf>) -> SessionBuilder {
        SessionBuilder::new(root)
    }

    /// Spawn the engine described by `config`.
    ///
    /// # Errors
    ///
    /// [`EngineError::ProcessStart`] if the engine cannot be started.
    pub async fn open(config: SessionConfig) -> Result<Self> {
        let log = SessionLog::with_capacity(config.transport.log_capacity);
        log.record(
            LogKind::Info,
            format!("Starting engine {}", config.program.display()),
        );

        let process = match spawn_engine(&config).await {
            Ok(process) => process,
            Err(e) => {
                log.record(LogKind::Error, e.to_string());
                return Err(e);
            }
        };

        let stderr_task = spawn_stderr_drain(process.stderr, log.clone());
        let mut session = Self::assemble(process.stdout, process.stdin, config.transport, log);
        session.child = Some(process.child);
        session.stderr_task = Some(stderr_task);
        session.file = config.file;
        Ok(session)
    }

    /// Run the protocol over already-connected streams instead of a spawned
    /// process. `reader` carries replies, `writer` carries commands.
    pub fn from_streams<R, W>(reader: R, writer: W, options: TransportOptions) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let log = SessionLog::with_capacity(options.log_capacity);
        Self::assemble(reader, writer, options, log)
    }

    fn assemble<R, W>(reader: R, writer: W, options: TransportOptions, log: SessionLog) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (phase_tx, _) = watch::channel(SessionPhase::Starting);
        let phase: PhaseCell = Arc::new(phase_tx);
        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));

        let exchange_task = spawn_exchange_task(
            reader,
            writer,
            rx,
            phase.clone(),
            log.clone(),
            ExchangeConfig {
                read_timeout: options.read_timeout,
                max_reply_size: options.max_reply_size,
            },
        );

        phase.send_replace(SessionPhase::Running);
        log.record(LogKind::Info, "Session running");

        Self {
            handle: SessionHandle { tx, phase, log },
            child: None,
            exchange_task: Some(exchange_task),
            stderr_task: None,
            file: None,
            quit_grace: options.quit_grace,
        }
    }

    /// A cloneable handle for executing commands.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// File the session was opened on, if any.
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Current lifecycle state.
    pub fn phase(&self) -> SessionPhase {
        self.handle.phase()
    }

    /// The session's traffic log.
    pub fn log(&self) -> &SessionLog {
        &self.handle.log
    }

    /// Close the session. Best effort; never fails.
    ///
    /// Commands still queued fail with [`EngineError::Closed`]. The quit
    /// command is sent once the exchange in flight (if any) finishes; if the
    /// engine is not gone after the grace period it is killed.
    pub async fn close(mut self) {
        terminate(&self.handle.phase, Termination::Closed);

        let (done_tx, done_rx) = oneshot::channel();
        let tx = self.handle.tx.clone();
        let quit = async move {
            if tx.send(Request::Shutdown { done: done_tx }).await.is_ok() {
                let _ = done_rx.await;
            }
        };
        if tokio::time::timeout(self.quit_grace, quit).await.is_err() {
            debug!("Quit command not delivered within grace period");
        }

        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(self.quit_grace, child.wait()).await {
                Ok(Ok(status)) => info!(%status, "Engine exited"),
                Ok(Err(e)) => warn!(error = %e, "Failed to wait for engine"),
                Err(_) => {
                    warn!("Engine still running after quit, killing");
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "Failed to kill engine");
                    }
                }
            }
        }

        if let Some(task) = self.exchange_task.take() {
            task.abort();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        self.handle.log.record(LogKind::Info, "Session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(task) = self.exchange_task.take() {
            terminate(&self.handle.phase, Termination::Closed);
            task.abort();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("phase", &self.phase())
            .field("file", &self.file)
            .field("pid", &self.child.as_ref().and_then(|c| c.id()))
            .finish()
    }
}

/// Cheap, cloneable handle for executing commands on a session.
///
/// All clones share one FIFO queue; at most one command is on the wire at a
/// time.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Request>,
    phase: PhaseCell,
    log: SessionLog,
}

impl SessionHandle {
    /// Execute a command and return its decoded, trailing-trimmed reply.
    ///
    /// Waits behind every command queued earlier. If the caller stops waiting
    /// before the command is written, it is skipped; once written, its reply
    /// is always read in full.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidCommand`] for text that cannot form one line
    /// - [`EngineError::EofTerminated`], [`EngineError::Transport`],
    ///   [`EngineError::Timeout`] or [`EngineError::Closed`] when the session
    ///   is or becomes dead
    pub async fn execute(&self, command: &Command) -> Result<String> {
        if let Some(cause) = termination(&self.phase) {
            return Err(cause.to_error());
        }
        let line = LineCodec::encode(command.as_str())?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Request::Exchange {
                command: command.to_string(),
                line,
                reply: reply_tx,
            })
            .await
            .map_err(|_| self.dead_error())?;

        reply_rx.await.map_err(|_| self.dead_error())?
    }

    /// Execute a command expecting plain text.
    pub async fn execute_text(&self, command: &str) -> Result<String> {
        self.execute(&Command::text(command)).await
    }

    /// Execute the structured (JSON) variant of a command.
    ///
    /// The verb gets the structured marker if it lacks it. An empty reply is
    /// returned as [`StructuredReply::Empty`], not an error.
    pub async fn execute_structured(&self, command: &str) -> Result<StructuredReply> {
        let text = self.execute(&Command::structured(command)).await?;
        Ok(StructuredReply::from_text(text))
    }

    /// Current lifecycle state.
    pub fn phase(&self) -> SessionPhase {
        self.phase.borrow().clone()
    }

    /// Whether commands are accepted.
    pub fn is_running(&self) -> bool {
        self.phase.borrow().is_running()
    }

    /// Watch lifecycle changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    /// The session's traffic log.
    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    fn dead_error(&self) -> EngineError {
        termination(&self.phase)
            .unwrap_or(Termination::Closed)
            .to_error()
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("phase", &self.phase())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fake_session, fake_session_with};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_execute_returns_trimmed_reply() {
        let session = fake_session(|cmd| match cmd {
            "?v ." => Some("0x100\n".to_string()),
            _ => Some(String::new()),
        });
        let engine = session.handle();

        assert_eq!(engine.execute_text("s 0x100").await.unwrap(), "");
        assert_eq!(engine.execute_text("?v .").await.unwrap(), "0x100");
        assert!(engine.is_running());
    }

    #[tokio::test]
    async fn test_concurrent_callers_get_their_own_replies() {
        let session = fake_session(|cmd| Some(format!("reply to {cmd}")));
        let engine = session.handle();

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..32 {
            let engine = engine.clone();
            tasks.spawn(async move {
                let reply = engine.execute_text(&format!("echo {i}")).await.unwrap();
                assert_eq!(reply, format!("reply to echo {i}"));
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap();
        }
    }

    #[tokio::test]
    async fn test_commands_run_in_submission_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        let session = fake_session(move |cmd| {
            record.lock().unwrap().push(cmd.to_string());
            Some(String::new())
        });
        let engine = session.handle();

        for i in 0..5 {
            engine.execute_text(&format!("cmd {i}")).await.unwrap();
        }
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["cmd 0", "cmd 1", "cmd 2", "cmd 3", "cmd 4"]
        );
    }

    #[tokio::test]
    async fn test_resync_discards_leftovers_and_unsolicited_output() {
        let (client, engine_side) = tokio::io::duplex(4096);
        let (client_read, client_write) = tokio::io::split(client);
        let (engine_read, mut engine_write) = tokio::io::split(engine_side);
        let second_sent = Arc::new(Notify::new());
        let notify = second_sent.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(engine_read).lines();
            lines.next_line().await.unwrap();
            // Reply plus trailing garbage in the same write.
            engine_write.write_all(b"one\0stale tail").await.unwrap();
            // Unsolicited output between exchanges.
            engine_write.write_all(b"async noise\0").await.unwrap();
            notify.notify_one();
            lines.next_line().await.unwrap();
            engine_write.write_all(b"two\0").await.unwrap();
            let _ = lines.next_line().await;
        });

        let session = Session::from_streams(client_read, client_write, TransportOptions::default());
        let engine = session.handle();

        assert_eq!(engine.execute_text("first").await.unwrap(), "one");
        second_sent.notified().await;
        assert_eq!(engine.execute_text("second").await.unwrap(), "two");
    }

    #[tokio::test]
    async fn test_eof_mid_reply_returns_partial_then_fails_fast() {
        let (client, engine_side) = tokio::io::duplex(4096);
        let (client_read, client_write) = tokio::io::split(client);
        let (engine_read, mut engine_write) = tokio::io::split(engine_side);
        let lines_seen = Arc::new(AtomicUsize::new(0));
        let counter = lines_seen.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(engine_read).lines();
            lines.next_line().await.unwrap();
            counter.fetch_add(1, Ordering::SeqCst);
            engine_write.write_all(b"partial out").await.unwrap();
            engine_write.shutdown().await.unwrap();
            // Keep reading so any later write would be observed.
            while let Ok(Some(_)) = lines.next_line().await {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let session = Session::from_streams(client_read, client_write, TransportOptions::default());
        let engine = session.handle();

        assert_eq!(engine.execute_text("pd 10").await.unwrap(), "partial out");
        assert_eq!(engine.phase(), SessionPhase::Terminated(Termination::Eof));

        let err = engine.execute_text("?v .").await.unwrap_err();
        assert!(matches!(err, EngineError::EofTerminated));
        tokio::task::yield_now().await;
        assert_eq!(lines_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_eof_without_output_is_error() {
        let session = fake_session(|cmd| if cmd == "crash" { None } else { Some("ok".into()) });
        let engine = session.handle();

        assert_eq!(engine.execute_text("ping").await.unwrap(), "ok");
        let err = engine.execute_text("crash").await.unwrap_err();
        assert!(matches!(err, EngineError::EofTerminated));
        assert!(err.is_terminal());

        let err = engine.execute_text("ping").await.unwrap_err();
        assert!(matches!(err, EngineError::EofTerminated));
    }

    #[tokio::test]
    async fn test_read_timeout_terminates_session() {
        let (client, engine_side) = tokio::io::duplex(4096);
        let (client_read, client_write) = tokio::io::split(client);
        let (engine_read, _engine_write) = tokio::io::split(engine_side);
        tokio::spawn(async move {
            let mut lines = BufReader::new(engine_read).lines();
            while let Ok(Some(_)) = lines.next_line().await {}
        });

        let options = TransportOptions {
            read_timeout: Some(Duration::from_millis(50)),
            ..TransportOptions::default()
        };
        let session = Session::from_streams(client_read, client_write, options);
        let engine = session.handle();

        let err = engine.execute_text("aaa").await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout(_)));
        assert!(matches!(
            engine.phase(),
            SessionPhase::Terminated(Termination::Timeout(_))
        ));

        let err = engine.execute_text("?v .").await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_abandoned_queued_command_is_skipped() {
        let (client, engine_side) = tokio::io::duplex(4096);
        let (client_read, client_write) = tokio::io::split(client);
        let (engine_read, mut engine_write) = tokio::io::split(engine_side);
        let release = Arc::new(Notify::new());
        let gate = release.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(engine_read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                record.lock().unwrap().push(line.clone());
                if line == "slow" {
                    gate.notified().await;
                }
                engine_write.write_all(format!("{line}\0").as_bytes()).await.unwrap();
            }
        });

        let session = Session::from_streams(client_read, client_write, TransportOptions::default());
        let engine = session.handle();

        let slow = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.execute_text("slow").await })
        };
        while seen.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }

        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), engine.execute_text("abandoned")).await;
        assert!(abandoned.is_err());

        release.notify_one();
        assert_eq!(slow.await.unwrap().unwrap(), "slow");
        assert_eq!(engine.execute_text("after").await.unwrap(), "after");

        assert_eq!(*seen.lock().unwrap(), vec!["slow", "after"]);
    }

    #[tokio::test]
    async fn test_structured_command_gets_marker() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        let session = fake_session(move |cmd| {
            record.lock().unwrap().push(cmd.to_string());
            match cmd {
                "iSj" => Some(r#"[{"name":".text"}]"#.to_string()),
                _ => Some(String::new()),
            }
        });
        let engine = session.handle();

        let reply = engine.execute_structured("iS").await.unwrap();
        assert!(matches!(&reply, StructuredReply::Payload(text) if text.contains(".text")));

        let empty = engine.execute_structured("axtj @ 0x10").await.unwrap();
        assert!(empty.is_empty());

        assert_eq!(*seen.lock().unwrap(), vec!["iSj", "axtj @ 0x10"]);
    }

    #[tokio::test]
    async fn test_invalid_command_does_not_touch_session() {
        let session = fake_session(|_| Some("ok".into()));
        let engine = session.handle();

        let err = engine.execute_text("s 0x10\nwx 90").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidCommand(_)));
        assert!(engine.is_running());
        assert_eq!(engine.execute_text("?v .").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_close_sends_quit_and_fails_later_calls() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        let session = fake_session_with(TransportOptions::default(), move |cmd| {
            record.lock().unwrap().push(cmd.to_string());
            Some(String::new())
        });
        let engine = session.handle();
        engine.execute_text("s 0x10").await.unwrap();

        session.close().await;

        let err = engine.execute_text("?v .").await.unwrap_err();
        assert!(matches!(err, EngineError::Closed));
        assert_eq!(engine.phase(), SessionPhase::Terminated(Termination::Closed));
        assert_eq!(seen.lock().unwrap()[0], "s 0x10");
    }

    #[tokio::test]
    async fn test_log_records_traffic() {
        let session = fake_session(|_| Some("0x100".into()));
        let engine = session.handle();
        engine.execute_text("?v .").await.unwrap();

        let kinds: Vec<_> = session.log().entries().into_iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&LogKind::Command));
        assert!(kinds.contains(&LogKind::Output));
    }

    #[test]
    fn test_builder_defaults() {
        let builder = Session::builder("/data/engine").file("/sdcard/a.bin");
        let config = builder.config();

        assert_eq!(config.program, PathBuf::from("/data/engine/bin/r2"));
        assert_eq!(config.file.as_deref(), Some(Path::new("/sdcard/a.bin")));
        assert_eq!(config.transport.read_timeout, None);
        assert_eq!(config.transport.quit_grace, DEFAULT_QUIT_GRACE);
        assert_eq!(config.transport.log_capacity, DEFAULT_LOG_CAPACITY);
    }

    #[tokio::test]
    async fn test_open_missing_program_fails_to_start() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Session::builder(tmp.path())
            .program(tmp.path().join("no-such-engine"))
            .open()
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ProcessStart(_)));
    }
}
