//! Engine subprocess supervision.
//!
//! Builds the engine's private directory layout, environment and command
//! line, spawns it with all three standard streams piped, and drains stderr
//! into the log for as long as the process lives.
//!
//! # Example
//!
//! ```ignore
//! use enginepipe::transport::{spawn_engine, EngineLayout};
//!
//! let layout = EngineLayout::new("/data/app/engine");
//! layout.create_dirs().await?;
//! let process = spawn_engine(&config).await?;
//! ```

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::log::{LogKind, SessionLog};
use crate::protocol::QUIET_FLAG;
use crate::session::SessionConfig;

/// Engine executable name inside the bin directory.
pub const ENGINE_BINARY: &str = "r2";

/// Argument standing in for "no file" (blank session).
pub const BLANK_SESSION_ARG: &str = "-";

/// Flag opening the bound file writable.
pub const WRITE_FLAG: &str = "-w";

/// PATH used when the parent has none.
pub const FALLBACK_PATH: &str = "/system/bin:/system/xbin";

/// Private storage layout of the engine installation.
///
/// ```text
/// <root>/bin      working directory, HOME, PATH prefix
/// <root>/lib      engine shared libraries
/// <root>/libs     support libraries
/// <root>/work     data home (plugins, history)
/// <root>/.cache   cache home
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineLayout {
    root: PathBuf,
}

impl EngineLayout {
    /// Layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.root.join("lib")
    }

    pub fn libs_dir(&self) -> PathBuf {
        self.root.join("libs")
    }

    pub fn work_dir(&self) -> PathBuf {
        self.root.join("work")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(".cache")
    }

    /// Default engine executable.
    pub fn engine_binary(&self) -> PathBuf {
        self.bin_dir().join(ENGINE_BINARY)
    }

    /// Create every directory of the layout.
    pub async fn create_dirs(&self) -> Result<()> {
        for dir in [
            self.bin_dir(),
            self.lib_dir(),
            self.libs_dir(),
            self.work_dir(),
            self.cache_dir(),
        ] {
            tokio::fs::create_dir_all(&dir).await?;
        }
        Ok(())
    }
}

/// Command-line arguments for the engine, after any leading arguments.
///
/// `-q0 [-w] <flags...> <file>`, or `-q0 -` for a blank session.
pub fn engine_arguments(
    file: Option<&Path>,
    open_flags: &[String],
    writable: bool,
) -> Vec<OsString> {
    let mut args = vec![OsString::from(QUIET_FLAG)];
    match file {
        Some(path) => {
            if writable {
                args.push(WRITE_FLAG.into());
            }
            args.extend(open_flags.iter().map(OsString::from));
            args.push(path.as_os_str().to_owned());
        }
        None => args.push(BLANK_SESSION_ARG.into()),
    }
    args
}

/// Environment overrides for the engine process.
///
/// `inherited_library_path` and `inherited_path` are the parent's values of
/// `LD_LIBRARY_PATH` and `PATH`; the engine's own directories go first.
pub fn engine_environment(
    layout: &EngineLayout,
    inherited_library_path: Option<&OsStr>,
    inherited_path: Option<&OsStr>,
) -> Result<Vec<(OsString, OsString)>> {
    let mut library_dirs = vec![layout.lib_dir(), layout.libs_dir()];
    if let Some(existing) = inherited_library_path.filter(|v| !v.is_empty()) {
        library_dirs.extend(std::env::split_paths(existing));
    }

    let mut path_dirs = vec![layout.bin_dir()];
    match inherited_path.filter(|v| !v.is_empty()) {
        Some(existing) => path_dirs.extend(std::env::split_paths(existing)),
        None => path_dirs.extend(std::env::split_paths(FALLBACK_PATH)),
    }

    let join = |dirs: Vec<PathBuf>| {
        std::env::join_paths(dirs).map_err(|e| EngineError::ProcessStart(e.to_string()))
    };

    Ok(vec![
        ("LD_LIBRARY_PATH".into(), join(library_dirs)?),
        ("XDG_DATA_HOME".into(), layout.work_dir().into_os_string()),
        ("XDG_CACHE_HOME".into(), layout.cache_dir().into_os_string()),
        ("HOME".into(), layout.bin_dir().into_os_string()),
        ("TERM".into(), "dumb".into()),
        ("NO_COLOR".into(), "1".into()),
        ("R2_NOCOLOR".into(), "1".into()),
        ("PATH".into(), join(path_dirs)?),
    ])
}

/// A freshly spawned engine with its streams taken.
pub struct EngineProcess {
    pub child: Child,
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Spawn the engine described by `config`.
///
/// # Errors
///
/// [`EngineError::ProcessStart`] if the directories cannot be created, the
/// program cannot be spawned, or it has already exited.
pub async fn spawn_engine(config: &SessionConfig) -> Result<EngineProcess> {
    let layout = &config.layout;
    layout
        .create_dirs()
        .await
        .map_err(|e| EngineError::ProcessStart(format!("Failed to prepare engine directories: {e}")))?;

    let env = engine_environment(
        layout,
        std::env::var_os("LD_LIBRARY_PATH").as_deref(),
        std::env::var_os("PATH").as_deref(),
    )?;

    let mut cmd = Command::new(&config.program);
    cmd.args(&config.leading_args);
    cmd.args(engine_arguments(
        config.file.as_deref(),
        &config.open_flags,
        config.writable,
    ));
    cmd.current_dir(layout.bin_dir());
    cmd.envs(env);
    cmd.envs(config.env.iter().map(|(k, v)| (k, v)));

    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    debug!(program = %config.program.display(), file = ?config.file, "Spawning engine");

    let mut child = cmd.spawn().map_err(|e| {
        EngineError::ProcessStart(format!(
            "Failed to spawn {}: {e}",
            config.program.display()
        ))
    })?;

    if let Some(status) = child
        .try_wait()
        .map_err(|e| EngineError::ProcessStart(e.to_string()))?
    {
        return Err(EngineError::ProcessStart(format!(
            "Engine exited immediately with {status}"
        )));
    }

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| EngineError::ProcessStart("Failed to get stdin".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| EngineError::ProcessStart("Failed to get stdout".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| EngineError::ProcessStart("Failed to get stderr".to_string()))?;

    info!(pid = ?child.id(), "Engine started");

    Ok(EngineProcess {
        child,
        stdin,
        stdout,
        stderr,
    })
}

/// Forward every stderr line to `tracing` and the session log until EOF.
pub fn spawn_stderr_drain<R>(stderr: R, log: SessionLog) -> JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line);
                    let text = text.trim_end();
                    if !text.is_empty() {
                        warn!(target: "enginepipe::engine", "{text}");
                        log.record(LogKind::Warning, text);
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Engine stderr closed");
                    break;
                }
            }
        }
    })
}
