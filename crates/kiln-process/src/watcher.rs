//! Background tasks attached to each launch: the output pump and the
//! lifecycle watcher

use std::io::{self, ErrorKind, Read};
use std::sync::Arc;
use std::thread;

use kiln_pty::{ExitReport, PtyChild};
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

use crate::environment::Shared;
use crate::events::ConsoleSink;
use crate::request::ExitCallback;

/// Exit code recorded when the real one cannot be determined
pub const SENTINEL_EXIT_CODE: i32 = 1;

const READ_BUFFER_SIZE: usize = 8192;

/// Copy pty output into `console` until EOF
///
/// Runs on a detached OS thread: nothing waits for it, and a child that
/// leaves a grandchild holding the terminal must not pin a runtime worker.
pub(crate) fn spawn_output_pump(
    mut output: Box<dyn Read + Send>,
    console: Arc<dyn ConsoleSink>,
    pid: u32,
) {
    let spawned = thread::Builder::new()
        .name(format!("kiln-console-{pid}"))
        .spawn(move || {
            let mut buf = [0u8; READ_BUFFER_SIZE];
            loop {
                match output.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => console.write_output(&buf[..n]),
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    // Linux reports EIO once the slave side is closed.
                    Err(e) => {
                        debug!(pid = %pid, error = %e, "Console stream closed");
                        break;
                    }
                }
            }
            debug!(pid = %pid, "Console pump finished");
        });

    if let Err(e) = spawned {
        warn!(pid = %pid, error = %e, "Failed to start console pump; output will be lost");
    }
}

/// Exit code to record for the outcome of a blocking wait
///
/// Anything short of a real exit status records [`SENTINEL_EXIT_CODE`].
fn exit_code(pid: u32, waited: Result<io::Result<ExitReport>, JoinError>) -> i32 {
    match waited {
        Ok(Ok(report)) => {
            debug!(pid = %pid, "{}", report);
            report.code
        }
        Ok(Err(e)) => {
            error!(pid = %pid, error = %e, "Error waiting on process");
            SENTINEL_EXIT_CODE
        }
        Err(e) => {
            error!(pid = %pid, error = %e, "Process wait task failed");
            SENTINEL_EXIT_CODE
        }
    }
}

/// Reap `child` in the background, then settle the environment
///
/// In order: record the exit code, release the process, resolve the
/// completion signal, publish `running=false`, run `callback`. No lock is
/// held while the callback runs, so it may launch again.
pub(crate) fn spawn_watcher(
    shared: Arc<Shared>,
    generation: u64,
    mut child: PtyChild,
    done: watch::Sender<bool>,
    callback: Option<ExitCallback>,
) {
    tokio::spawn(async move {
        let pid = child.pid();
        let waited = tokio::task::spawn_blocking(move || child.wait()).await;
        let exit_code = exit_code(pid, waited);

        let current = shared.release(generation, exit_code);
        done.send_replace(true);

        if current {
            shared.publish_status(false);
        } else {
            debug!(pid = %pid, generation, "Exit observed after a newer launch; state left alone");
        }

        info!(pid = %pid, exit_code, "Process exited");

        if let Some(callback) = callback {
            callback(exit_code);
        }
    });
}
