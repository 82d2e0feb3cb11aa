//! Domain layer - value objects shared by the spawner and its callers

pub mod config;
pub mod exit;

pub use config::PtyConfig;
pub use exit::ExitReport;
