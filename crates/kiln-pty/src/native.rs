//! Native pty spawner backed by `portable-pty`

use std::fmt;
use std::io::{self, Read, Write};

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tracing::{debug, info};

use crate::{
    domain::{ExitReport, PtyConfig},
    error::{PtyError, Result},
};

/// A child process running on its own pty, plus both ends of the master
///
/// The fields are public so callers can hand each part to a different task:
/// the child to whoever reaps it, `output` to a reader loop, `input` to
/// whoever relays keystrokes.
pub struct PtyProcess {
    /// The spawned child
    pub child: PtyChild,
    /// Read side of the master (combined stdout/stderr of the child)
    pub output: Box<dyn Read + Send>,
    /// Write side of the master (the child's stdin)
    pub input: Box<dyn Write + Send>,
    /// The master itself; dropping it closes the pty
    pub master: PtyMaster,
}

impl fmt::Debug for PtyProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PtyProcess")
            .field("child", &self.child)
            .finish_non_exhaustive()
    }
}

/// Owned handle on a pty child
#[derive(Debug)]
pub struct PtyChild {
    pid: u32,
    inner: Box<dyn Child + Send + Sync>,
}

impl PtyChild {
    /// OS process id
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Block until the child exits and reap it
    pub fn wait(&mut self) -> io::Result<ExitReport> {
        let status = self.inner.wait()?;
        Ok(ExitReport::from_status(&status))
    }
}

/// Master side of the pty, kept alive for as long as the child runs
///
/// Never read; holding it keeps the pty open.
pub struct PtyMaster {
    _master: Box<dyn MasterPty + Send>,
}

impl fmt::Debug for PtyMaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PtyMaster").finish_non_exhaustive()
    }
}

/// Allocate a pty and start `config.command` on it
///
/// The child runs with exactly `config.env`; the supervisor environment is
/// not inherited. The slave end is closed in this process once the child has
/// it, so reads on `output` hit EOF when the child (and anything it forked
/// onto the terminal) is gone.
pub fn spawn(config: &PtyConfig) -> Result<PtyProcess> {
    if !config.cwd.is_dir() {
        return Err(PtyError::WorkingDirectory {
            path: config.cwd.clone(),
        });
    }

    debug!(
        command = %config.command,
        args = ?config.args,
        cwd = %config.cwd.display(),
        "Opening pty"
    );

    let pair = native_pty_system()
        .openpty(PtySize {
            rows: config.rows,
            cols: config.cols,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(PtyError::Open)?;

    let mut cmd = CommandBuilder::new(&config.command);
    cmd.args(&config.args);
    cmd.cwd(&config.cwd);
    cmd.env_clear();
    for (key, value) in &config.env {
        cmd.env(key, value);
    }

    let mut child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|source| PtyError::Spawn {
            command: config.command.clone(),
            source,
        })?;
    drop(pair.slave);

    let Some(pid) = child.process_id() else {
        let _ = child.kill();
        return Err(PtyError::MissingPid {
            command: config.command.clone(),
        });
    };

    let attached = pair.master.try_clone_reader().and_then(|output| {
        let input = pair.master.take_writer()?;
        Ok((output, input))
    });
    let (output, input) = match attached {
        Ok(io) => io,
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(PtyError::Attach(e));
        }
    };

    info!(pid = %pid, command = %config.command, "Process spawned on pty");

    Ok(PtyProcess {
        child: PtyChild { pid, inner: child },
        output,
        input,
        master: PtyMaster {
            _master: pair.master,
        },
    })
}
