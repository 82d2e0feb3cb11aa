//! Execution request value object

use std::collections::HashMap;
use std::fmt;

/// Invoked once with the exit code after the watched process has exited
pub type ExitCallback = Box<dyn FnOnce(i32) + Send + 'static>;

/// One launch of the main process
///
/// Built with the same chained style as the rest of the crate:
///
/// ```
/// use kiln_process::ExecutionRequest;
///
/// let request = ExecutionRequest::new("/usr/bin/java")
///     .args(["-Xmx2G", "-jar", "server.jar", "nogui"])
///     .working_dir("server")
///     .env("EULA", "true");
/// assert_eq!(request.arguments.len(), 4);
/// ```
pub struct ExecutionRequest {
    /// Program to execute
    pub command: String,
    /// Program arguments
    pub arguments: Vec<String>,
    /// Working directory relative to the environment root
    pub working_directory: String,
    /// Environment overrides; these win over inherited and default values
    pub environment: HashMap<String, String>,
    /// Completion callback
    pub callback: Option<ExitCallback>,
}

impl ExecutionRequest {
    /// Request running `command` in the environment root
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            arguments: Vec::new(),
            working_directory: String::new(),
            environment: HashMap::new(),
            callback: None,
        }
    }

    /// Set command arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set working directory, relative to the environment root
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_directory = dir.into();
        self
    }

    /// Add environment override
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Run `callback` with the exit code once the process is gone
    #[must_use]
    pub fn on_exit(mut self, callback: impl FnOnce(i32) + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for ExecutionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionRequest")
            .field("command", &self.command)
            .field("arguments", &self.arguments)
            .field("working_directory", &self.working_directory)
            .field("environment", &self.environment)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
