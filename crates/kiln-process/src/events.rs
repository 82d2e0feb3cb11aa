//! Status events and the sinks that receive process output and state changes

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Running/installing snapshot published on every start and stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Whether the main process is running
    pub running: bool,
    /// Whether the environment is in install mode
    pub installing: bool,
}

/// Receives status transitions
pub trait StatusSink: Send + Sync {
    /// Publish one event. Must not block.
    fn publish(&self, event: StatusEvent);
}

/// Receives raw pty output
///
/// Called from a single reader at a time with whatever the pty returned,
/// which need not end on a line or UTF-8 boundary.
pub trait ConsoleSink: Send + Sync {
    /// Forward one chunk of output
    fn write_output(&self, data: &[u8]);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl StatusSink for NullSink {
    fn publish(&self, _event: StatusEvent) {}
}

impl ConsoleSink for NullSink {
    fn write_output(&self, _data: &[u8]) {}
}

/// Logs console output at `debug`, one record per line
#[derive(Debug, Clone, Default)]
pub struct TracingConsole {
    label: String,
}

impl TracingConsole {
    /// Tag every record with `label`
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl ConsoleSink for TracingConsole {
    fn write_output(&self, data: &[u8]) {
        for line in String::from_utf8_lossy(data).lines() {
            let line = line.trim_end_matches('\r');
            if !line.is_empty() {
                debug!(environment = %self.label, "console: {}", line);
            }
        }
    }
}

impl StatusSink for broadcast::Sender<StatusEvent> {
    fn publish(&self, event: StatusEvent) {
        // No subscribers is fine; nobody is listening yet.
        let _ = self.send(event);
    }
}

impl ConsoleSink for broadcast::Sender<Vec<u8>> {
    fn write_output(&self, data: &[u8]) {
        let _ = self.send(data.to_vec());
    }
}
