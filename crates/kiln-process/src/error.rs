//! Error types for environment supervision

use std::io;
use thiserror::Error;

/// Environment supervision errors
#[derive(Debug, Error)]
pub enum ProcessError {
    /// A live process already occupies this environment
    #[error("A process is already running in this environment")]
    ProcessAlreadyRunning,

    /// Input was sent while no process is running
    #[error("Server is offline")]
    ServerOffline,

    /// Pty allocation or child spawn failed
    #[error(transparent)]
    Spawn(#[from] kiln_pty::PtyError),

    /// Signal delivery or liveness probe failed
    #[error("Failed to signal process (PID: {pid}): {source}")]
    Signal {
        /// Target process
        pid: u32,
        /// OS error
        #[source]
        source: nix::errno::Errno,
    },

    /// Signal number does not name a signal on this platform
    #[error("Invalid signal number: {0}")]
    InvalidSignal(i32),

    /// Writing to the process input failed
    #[error("Failed to write to process input: {0}")]
    Input(#[source] io::Error),

    /// Resource usage could not be sampled
    #[error("Failed to sample stats for process (PID: {pid})")]
    StatsUnavailable {
        /// Target process
        pid: u32,
    },

    /// Filesystem operation on the root directory failed
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for environment operations
pub type Result<T> = std::result::Result<T, ProcessError>;

/// Settings errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Sources could not be read or merged
    #[error("Config error: {0}")]
    Load(#[from] ::config::ConfigError),

    /// Loaded values are out of range
    #[error("Validation error: {0}")]
    Validation(String),
}
