//! Environment settings and their loader

use std::path::PathBuf;
use std::time::Duration;

use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Prefix of supervisor-internal variables; never passed on to children
pub const DEFAULT_RESERVED_PREFIX: &str = "KILN_";

/// Terminal type advertised to children
pub const DEFAULT_TERM: &str = "xterm-256color";

/// Tunables shared by every environment in a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSettings {
    /// Variables starting with this prefix are stripped from child environments
    pub reserved_env_prefix: String,
    /// Value of `TERM` given to children
    pub term: String,
    /// Permission bits for a freshly created root directory
    pub root_dir_mode: u32,
    /// CPU sampling window in milliseconds
    pub stats_window_ms: u64,
    /// Pty height
    pub pty_rows: u16,
    /// Pty width
    pub pty_cols: u16,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            reserved_env_prefix: DEFAULT_RESERVED_PREFIX.to_string(),
            term: DEFAULT_TERM.to_string(),
            root_dir_mode: 0o755,
            stats_window_ms: 1000,
            pty_rows: kiln_pty::domain::config::DEFAULT_ROWS,
            pty_cols: kiln_pty::domain::config::DEFAULT_COLS,
        }
    }
}

impl EnvironmentSettings {
    /// CPU sampling window
    pub fn stats_window(&self) -> Duration {
        Duration::from_millis(self.stats_window_ms)
    }

    /// Reject values the supervisor cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reserved_env_prefix.is_empty() {
            return Err(ConfigError::Validation(
                "reserved_env_prefix must not be empty".to_string(),
            ));
        }
        if self.term.is_empty() {
            return Err(ConfigError::Validation("term must not be empty".to_string()));
        }
        if self.stats_window_ms == 0 {
            return Err(ConfigError::Validation(
                "stats_window_ms must be greater than 0".to_string(),
            ));
        }
        if self.pty_rows == 0 || self.pty_cols == 0 {
            return Err(ConfigError::Validation(
                "pty_rows and pty_cols must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads [`EnvironmentSettings`] from an optional TOML file overlaid with
/// prefixed environment variables
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    config_path: PathBuf,
    env_prefix: String,
}

impl SettingsLoader {
    /// Loader for the default file location and the `KILN` prefix
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
            env_prefix: "KILN".to_string(),
        }
    }

    /// Loader for a specific file
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
            ..Self::new()
        }
    }

    /// Override the environment variable prefix
    #[must_use]
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// `<config dir>/kiln/kiln.toml`
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kiln")
            .join("kiln.toml")
    }

    /// Build and validate settings. A missing file is not an error.
    pub fn load(&self) -> Result<EnvironmentSettings, ConfigError> {
        let builder = Config::builder()
            .add_source(File::from(self.config_path.clone()).required(false))
            .add_source(Environment::with_prefix(&self.env_prefix).try_parsing(true));

        let settings: EnvironmentSettings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}
