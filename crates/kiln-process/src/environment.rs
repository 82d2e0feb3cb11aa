//! The environment aggregate: one root directory, at most one main process

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kiln_pty::{PtyConfig, PtyMaster, PtyProcess};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::{
    config::EnvironmentSettings,
    env_vars::{build_child_env, current_vars},
    error::{ProcessError, Result},
    events::{ConsoleSink, NullSink, StatusEvent, StatusSink},
    request::ExecutionRequest,
    signal,
    stats::{self, Stats},
    watcher,
};

/// Shared input writer of the running process
pub(crate) type InputWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Live process owned by the environment between launch and exit
pub(crate) struct ActiveProcess {
    pub(crate) generation: u64,
    pub(crate) pid: u32,
    pub(crate) input: InputWriter,
    pub(crate) done: watch::Receiver<bool>,
    // Holds the pty open until the watcher releases the process.
    _master: PtyMaster,
}

/// `Idle` until a launch succeeds, `Active` until the watcher observes exit
pub(crate) enum ProcessState {
    Idle,
    Active(ActiveProcess),
}

impl ProcessState {
    /// The active process, if the OS still reports it alive
    fn live(&self) -> Result<Option<&ActiveProcess>> {
        match self {
            ProcessState::Active(active) if signal::is_alive(active.pid)? => Ok(Some(active)),
            _ => Ok(None),
        }
    }
}

pub(crate) struct Shared {
    pub(crate) root: PathBuf,
    pub(crate) settings: EnvironmentSettings,
    pub(crate) state: Mutex<ProcessState>,
    pub(crate) last_exit_code: Mutex<Option<i32>>,
    generation: AtomicU64,
    installing: Arc<AtomicBool>,
    status: Arc<dyn StatusSink>,
    pub(crate) console: Arc<dyn ConsoleSink>,
}

impl Shared {
    pub(crate) fn publish_status(&self, running: bool) {
        self.status.publish(StatusEvent {
            running,
            installing: self.installing.load(Ordering::SeqCst),
        });
    }

    /// Record the exit and return to `Idle` if `generation` is still current
    ///
    /// An exit from an older launch changes nothing. Dropping the active
    /// process closes the pty master and input writer. Returns whether the
    /// state was cleared.
    pub(crate) fn release(&self, generation: u64, exit_code: i32) -> bool {
        let mut state = self.state.lock();
        match &*state {
            ProcessState::Active(active) if active.generation == generation => {
                *self.last_exit_code.lock() = Some(exit_code);
                *state = ProcessState::Idle;
                true
            }
            _ => false,
        }
    }
}

/// Supervisor for one main process rooted at a directory
///
/// Cheap to clone; clones share the same process state. All operations may be
/// called concurrently from any task.
#[derive(Clone)]
pub struct Environment {
    inner: Arc<Shared>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("root", &self.inner.root)
            .field("pid", &self.pid())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Environment`]
pub struct EnvironmentBuilder {
    root: PathBuf,
    settings: EnvironmentSettings,
    status: Arc<dyn StatusSink>,
    console: Arc<dyn ConsoleSink>,
    installing: Arc<AtomicBool>,
}

impl EnvironmentBuilder {
    /// Use `settings` instead of the defaults
    #[must_use]
    pub fn settings(mut self, settings: EnvironmentSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Where status transitions go
    #[must_use]
    pub fn status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status = sink;
        self
    }

    /// Where process output goes
    #[must_use]
    pub fn console_sink(mut self, sink: Arc<dyn ConsoleSink>) -> Self {
        self.console = sink;
        self
    }

    /// Share an externally owned install flag
    #[must_use]
    pub fn install_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.installing = flag;
        self
    }

    /// Finish building
    pub fn build(self) -> Environment {
        Environment {
            inner: Arc::new(Shared {
                root: self.root,
                settings: self.settings,
                state: Mutex::new(ProcessState::Idle),
                last_exit_code: Mutex::new(None),
                generation: AtomicU64::new(0),
                installing: self.installing,
                status: self.status,
                console: self.console,
            }),
        }
    }
}

impl Environment {
    /// Environment with default settings and sinks that discard everything
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::builder(root).build()
    }

    /// Start configuring an environment rooted at `root`
    pub fn builder(root: impl Into<PathBuf>) -> EnvironmentBuilder {
        EnvironmentBuilder {
            root: root.into(),
            settings: EnvironmentSettings::default(),
            status: Arc::new(NullSink),
            console: Arc::new(NullSink),
            installing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Root directory
    pub fn root_directory(&self) -> &Path {
        &self.inner.root
    }

    /// Settings in effect
    pub fn settings(&self) -> &EnvironmentSettings {
        &self.inner.settings
    }

    /// Exit code of the most recently observed exit
    pub fn last_exit_code(&self) -> Option<i32> {
        *self.inner.last_exit_code.lock()
    }

    /// Pid of the current process, without probing the OS
    pub fn pid(&self) -> Option<u32> {
        match &*self.inner.state.lock() {
            ProcessState::Active(active) => Some(active.pid),
            ProcessState::Idle => None,
        }
    }

    /// Whether the environment is in install mode
    pub fn is_installing(&self) -> bool {
        self.inner.installing.load(Ordering::SeqCst)
    }

    /// Flip install mode; reported with the next status event
    pub fn set_installing(&self, installing: bool) {
        self.inner.installing.store(installing, Ordering::SeqCst);
    }

    /// Create the root directory
    ///
    /// Fails if it already exists; callers decide whether that matters.
    pub async fn create(&self) -> Result<()> {
        let mut builder = tokio::fs::DirBuilder::new();
        builder.mode(self.inner.settings.root_dir_mode);
        builder.create(&self.inner.root).await?;
        debug!(root = %self.inner.root.display(), "Created environment root");
        Ok(())
    }

    /// Start the main process on a fresh pty
    ///
    /// Returns as soon as the child is spawned. Output is forwarded to the
    /// console sink, and a watcher task reaps the child, emits the stop event
    /// and runs the request's callback. Must be called within a Tokio runtime.
    ///
    /// # Errors
    /// [`ProcessError::ProcessAlreadyRunning`] if a live process exists, or the
    /// spawn error. Either way the environment is left as it was.
    pub async fn launch(&self, request: ExecutionRequest) -> Result<()> {
        let ExecutionRequest {
            command,
            arguments,
            working_directory,
            environment,
            callback,
        } = request;
        let settings = &self.inner.settings;
        let root = &self.inner.root;

        let env = build_child_env(
            current_vars(),
            &settings.reserved_env_prefix,
            root,
            &settings.term,
            &environment,
        );
        let config = PtyConfig::new(command, root.join(&working_directory))
            .with_args(arguments)
            .with_env(env.into_vec())
            .with_size(settings.pty_rows, settings.pty_cols);
        let command_line = config.display_command();

        let mut state = self.inner.state.lock();
        if state.live()?.is_some() {
            return Err(ProcessError::ProcessAlreadyRunning);
        }

        // Registered before the spawn so a waiter never sees a gap.
        let (done_tx, done_rx) = watch::channel(false);

        info!(command = %command_line, "Starting process");
        self.inner
            .console
            .write_output(format!("Starting process: {command_line}\r\n").as_bytes());

        let PtyProcess {
            child,
            output,
            input,
            master,
        } = match kiln_pty::spawn(&config) {
            Ok(process) => process,
            Err(e) => {
                error!(command = %command_line, error = %e, "Failed to start process");
                return Err(e.into());
            }
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let pid = child.pid();
        *state = ProcessState::Active(ActiveProcess {
            generation,
            pid,
            input: Arc::new(Mutex::new(input)),
            done: done_rx,
            _master: master,
        });
        drop(state);

        self.inner.publish_status(true);
        watcher::spawn_output_pump(output, Arc::clone(&self.inner.console), pid);
        watcher::spawn_watcher(Arc::clone(&self.inner), generation, child, done_tx, callback);

        debug!(pid = %pid, generation, "Process launched");
        Ok(())
    }

    /// True if a process was launched and the OS still reports it alive
    pub fn is_running(&self) -> Result<bool> {
        Ok(self.inner.state.lock().live()?.is_some())
    }

    /// Write `text` plus a newline to the process input
    ///
    /// Blocks (off the async executor) for as long as the child does not
    /// drain its terminal input.
    ///
    /// # Errors
    /// [`ProcessError::ServerOffline`] when nothing is running.
    pub async fn send_input(&self, text: &str) -> Result<()> {
        let input = {
            let state = self.inner.state.lock();
            match state.live()? {
                Some(active) => Arc::clone(&active.input),
                None => return Err(ProcessError::ServerOffline),
            }
        };

        let line = format!("{text}\n");
        tokio::task::spawn_blocking(move || {
            let mut writer = input.lock();
            writer.write_all(line.as_bytes())?;
            writer.flush()
        })
        .await
        .map_err(|e| ProcessError::Input(io::Error::new(io::ErrorKind::Other, e)))?
        .map_err(ProcessError::Input)
    }

    /// Deliver signal number `code`; a no-op when nothing is running
    pub fn send_signal(&self, code: i32) -> Result<()> {
        let state = self.inner.state.lock();
        match state.live()? {
            Some(active) => {
                debug!(pid = %active.pid, signal = code, "Sending signal");
                signal::send(active.pid, code)
            }
            None => Ok(()),
        }
    }

    /// SIGKILL the process; a no-op when nothing is running
    ///
    /// Does not wait for the watcher to observe the exit.
    pub fn kill(&self) -> Result<()> {
        let state = self.inner.state.lock();
        match state.live()? {
            Some(active) => {
                info!(pid = %active.pid, "Killing process");
                signal::force_kill(active.pid)
            }
            None => Ok(()),
        }
    }

    /// Wait until the process exits
    pub async fn wait_for_main_process(&self) -> Result<()> {
        self.wait_for_main_process_for(Duration::ZERO).await
    }

    /// Wait until the process exits, killing it once `timeout` elapses
    ///
    /// A zero `timeout` waits forever. Returns immediately when nothing is
    /// running.
    ///
    /// # Errors
    /// The kill error, if the timeout fired and the kill failed.
    pub async fn wait_for_main_process_for(&self, timeout: Duration) -> Result<()> {
        let mut done = {
            let state = self.inner.state.lock();
            match state.live()? {
                Some(active) => active.done.clone(),
                None => return Ok(()),
            }
        };

        if timeout.is_zero() {
            wait_done(&mut done).await;
            return Ok(());
        }

        let timed_out = tokio::select! {
            () = wait_done(&mut done) => false,
            () = sleep(timeout) => true,
        };
        if timed_out {
            warn!(timeout = ?timeout, "Process did not exit in time");
            self.kill()?;
            wait_done(&mut done).await;
        }
        Ok(())
    }

    /// CPU and memory usage of the process
    ///
    /// Takes one sampling window while running; returns zeroes immediately
    /// otherwise, so a zero snapshot says nothing about liveness.
    pub async fn get_stats(&self) -> Result<Stats> {
        let pid = match self.inner.state.lock().live()? {
            Some(active) => active.pid,
            None => return Ok(Stats::default()),
        };
        stats::sample(pid, self.inner.settings.stats_window()).await
    }
}

async fn wait_done(done: &mut watch::Receiver<bool>) {
    // A dropped sender also means the watcher is finished.
    let _ = done.wait_for(|finished| *finished).await;
}
