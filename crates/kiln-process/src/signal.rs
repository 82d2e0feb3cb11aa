//! Signal delivery and liveness probing

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::error::{ProcessError, Result};

/// Probe `pid` with signal 0
///
/// A missing process or one we may not signal counts as not running.
pub(crate) fn is_alive(pid: u32) -> Result<bool> {
    let Some(target) = to_pid(pid) else {
        return Ok(false);
    };
    match kill(target, None::<Signal>) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH | Errno::EPERM) => Ok(false),
        Err(source) => Err(ProcessError::Signal { pid, source }),
    }
}

/// Deliver signal number `code` to `pid`; `0` only checks deliverability
pub(crate) fn send(pid: u32, code: i32) -> Result<()> {
    let signal = if code == 0 {
        None
    } else {
        Some(Signal::try_from(code).map_err(|_| ProcessError::InvalidSignal(code))?)
    };
    deliver(pid, signal)
}

/// SIGKILL `pid`
pub(crate) fn force_kill(pid: u32) -> Result<()> {
    deliver(pid, Some(Signal::SIGKILL))
}

fn deliver(pid: u32, signal: Option<Signal>) -> Result<()> {
    let target = to_pid(pid).ok_or(ProcessError::Signal {
        pid,
        source: Errno::ESRCH,
    })?;
    kill(target, signal).map_err(|source| ProcessError::Signal { pid, source })
}

// Only positive pids; zero or negative values would address process groups.
fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid)
        .ok()
        .filter(|raw| *raw > 0)
        .map(Pid::from_raw)
}
