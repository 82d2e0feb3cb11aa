//! Kiln PTY - pseudo-terminal support for Kiln environments
//!
//! This crate allocates a pseudo-terminal pair and starts a single child
//! process on it. The child becomes a session leader with the pty slave as
//! its controlling terminal, so signals aimed at the foreground group only
//! reach the child. Callers receive the child handle plus the master's read
//! and write sides and decide how to pump them.

pub mod domain;
pub mod error;
pub mod native;

// Re-export commonly used types
pub use domain::{ExitReport, PtyConfig};
pub use error::{PtyError, Result};
pub use native::{spawn, PtyChild, PtyMaster, PtyProcess};
