//! On-demand CPU and memory sampling

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sysinfo::{Pid, System};
use tokio::time::sleep;
use tracing::debug;

use crate::error::{ProcessError, Result};

/// Resource usage of the main process
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// CPU usage in percent of one core; can exceed 100 on multi-core hosts
    pub cpu: f64,
    /// Resident memory in bytes
    pub memory: f64,
}

/// Sample `pid` over `window`
///
/// CPU usage is the delta between two refreshes `window` apart, so this
/// always takes at least `window`. Memory is read at the end of the window.
pub async fn sample(pid: u32, window: Duration) -> Result<Stats> {
    let target = Pid::from_u32(pid);
    let mut system = System::new();

    if !system.refresh_process(target) {
        return Err(ProcessError::StatsUnavailable { pid });
    }

    sleep(window).await;

    if !system.refresh_process(target) {
        return Err(ProcessError::StatsUnavailable { pid });
    }

    let process = system
        .process(target)
        .ok_or(ProcessError::StatsUnavailable { pid })?;

    #[allow(clippy::cast_precision_loss)]
    let memory = process.memory() as f64;
    let stats = Stats {
        cpu: f64::from(process.cpu_usage()),
        memory,
    };
    debug!(pid = %pid, cpu = stats.cpu, memory = stats.memory, "Sampled process stats");
    Ok(stats)
}
