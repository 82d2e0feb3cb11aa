//! Error types for pty allocation and spawning

use std::path::PathBuf;
use thiserror::Error;

/// PTY errors
#[derive(Debug, Error)]
pub enum PtyError {
    /// Failed to allocate a pty pair
    #[error("Failed to open pty: {0}")]
    Open(#[source] anyhow::Error),

    /// Failed to start the child on the pty
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        /// Program that failed to start
        command: String,
        /// Underlying error
        #[source]
        source: anyhow::Error,
    },

    /// Failed to obtain a read or write handle on the master side
    #[error("Failed to attach to pty master: {0}")]
    Attach(#[source] anyhow::Error),

    /// Working directory does not exist
    #[error("Working directory does not exist: {}", path.display())]
    WorkingDirectory {
        /// Missing directory
        path: PathBuf,
    },

    /// Child started without a process id
    #[error("Spawned '{command}' but the OS reported no process id")]
    MissingPid {
        /// Program that was started
        command: String,
    },
}

/// Result type for pty operations
pub type Result<T> = std::result::Result<T, PtyError>;
