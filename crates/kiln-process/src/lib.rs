//! # kiln-process
//!
//! **Purpose**: Supervise the main process of one Kiln environment
//!
//! An [`Environment`] owns a root directory and at most one long-lived child
//! (typically a game server) running on a pseudo-terminal. It launches the
//! child without blocking, streams its output to a [`ConsoleSink`], relays
//! input lines, delivers signals, samples resource usage, and publishes a
//! [`StatusEvent`] on every start and stop.
//!
//! ## Features
//!
//! - **Non-blocking launch**: returns once the child is spawned
//! - **Lifecycle watcher**: reaps the child, records its exit code, runs a callback
//! - **Control surface**: liveness, input, signals, kill, bounded waits
//! - **Stats**: CPU over a fixed window plus resident memory
//! - **Hygienic environment**: supervisor-internal variables never reach the child
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use kiln_process::{Environment, ExecutionRequest};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let environment = Environment::new("/srv/kiln/survival");
//! environment.create().await?;
//!
//! let request = ExecutionRequest::new("/usr/bin/java")
//!     .args(["-jar", "server.jar", "nogui"])
//!     .on_exit(|code| println!("server exited with {code}"));
//! environment.launch(request).await?;
//!
//! environment.send_input("say hello").await?;
//! environment.send_input("stop").await?;
//! environment.wait_for_main_process_for(Duration::from_secs(30)).await?;
//! # Ok(())
//! # }
//! ```

#[cfg(not(unix))]
compile_error!("kiln-process supports unix targets only");

pub mod config;
pub mod env_vars;
pub mod environment;
pub mod error;
pub mod events;
pub mod request;
pub mod stats;
mod signal;
mod watcher;

pub use config::{EnvironmentSettings, SettingsLoader};
pub use environment::{Environment, EnvironmentBuilder};
pub use error::{ConfigError, ProcessError, Result};
pub use events::{ConsoleSink, NullSink, StatusEvent, StatusSink, TracingConsole};
pub use request::{ExecutionRequest, ExitCallback};
pub use stats::Stats;
pub use watcher::SENTINEL_EXIT_CODE;
