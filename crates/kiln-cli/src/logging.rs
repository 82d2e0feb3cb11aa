//! Logging setup for `kiln` using `tracing` + `tracing-subscriber`.
//!
//! The filter comes from `KILN_LOG` (any `EnvFilter` directive, e.g.
//! `debug` or `kiln_process=trace`), falling back to `--log-level` and then
//! `info`. Logs go to stderr so stdout carries only the server console.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "KILN_LOG";

/// Install the global subscriber. Call once at startup.
pub fn init_logging(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}
