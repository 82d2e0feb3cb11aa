//! PTY spawn configuration value object

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::PathBuf;

/// Default terminal height in rows
pub const DEFAULT_ROWS: u16 = 24;
/// Default terminal width in columns
pub const DEFAULT_COLS: u16 = 80;

/// Everything needed to start one child on a fresh pty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtyConfig {
    /// Program to execute
    pub command: String,
    /// Program arguments
    pub args: Vec<String>,
    /// Working directory; must exist
    pub cwd: PathBuf,
    /// Complete child environment, not necessarily UTF-8. Nothing is
    /// inherited implicitly.
    pub env: Vec<(OsString, OsString)>,
    /// Terminal height
    pub rows: u16,
    /// Terminal width
    pub cols: u16,
}

impl PtyConfig {
    /// Create new config for `command`, running in `cwd`
    pub fn new(command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: Vec::new(),
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
        }
    }

    /// Set args
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the full child environment
    #[must_use]
    pub fn with_env<I, K, V>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        self.env = env
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        self
    }

    /// Set terminal size
    #[must_use]
    pub fn with_size(mut self, rows: u16, cols: u16) -> Self {
        self.rows = rows;
        self.cols = cols;
        self
    }

    /// Command line as shown to humans: program followed by its arguments
    pub fn display_command(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}
