//! Transport module - the engine subprocess and its standard streams.
//!
//! Provides:
//! - the engine's private directory layout
//! - environment and command-line construction
//! - spawning with piped stdio and a continuous stderr drain

mod process;

pub use process::{
    engine_arguments, engine_environment, spawn_engine, spawn_stderr_drain, EngineLayout,
    EngineProcess, BLANK_SESSION_ARG, ENGINE_BINARY, FALLBACK_PATH, WRITE_FLAG,
};
