//! Exit information reported by a reaped pty child

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of waiting on a pty child
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitReport {
    /// Exit code as reported by the pty layer. Signal deaths report `1`.
    pub code: i32,
    /// Whether the child exited successfully
    pub success: bool,
}

impl ExitReport {
    pub(crate) fn from_status(status: &portable_pty::ExitStatus) -> Self {
        Self {
            code: i32::try_from(status.exit_code()).unwrap_or(i32::MAX),
            success: status.success(),
        }
    }
}

impl fmt::Display for ExitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exit status {}", self.code)
    }
}
