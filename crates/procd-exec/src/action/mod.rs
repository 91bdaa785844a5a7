//! Supervised child processes.
//!
//! A [`ProcessAction`] owns one spawned child together with two reader
//! threads that copy its stdout and stderr into bounded buffers. The
//! dispatcher polls the action in slices, draining whatever output has
//! accumulated, until the child exits or the caller's budget runs out.

mod buffer;
mod kinds;

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use strum::Display;
use thiserror::Error;
use tracing::{debug, warn};

use self::buffer::OutputBuffer;

pub use self::kinds::{ActionFactory, ActionKinds, OS_COMMAND_KIND};

/// Tracing target for process supervision.
const ACTION_TARGET: &str = "procd_exec::action";

/// Default ceiling of each output buffer.
pub const DEFAULT_OUTPUT_CEILING: usize = 64 * 1024;

/// Bytes copied per reader iteration.
const READ_CHUNK: usize = 4 * 1024;

/// Upper bound on one `try_wait` sleep while waiting for exit.
const WAIT_TICK: Duration = Duration::from_millis(10);

/// How long [`ProcessAction::finish_output`] waits for readers to reach EOF.
const READER_GRACE: Duration = Duration::from_secs(2);

/// Exit code reported when the child was killed by a signal.
const SIGNALLED_EXIT_CODE: i32 = -1;

/// Lifecycle state of a [`ProcessAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ActionStatus {
    /// Created but not yet spawned.
    NotStarted,
    /// Spawned and not yet observed to exit.
    Started,
    /// Exited on its own; the exit code is recorded.
    Finished,
    /// Spawning failed.
    FailedToStart,
    /// Killed through [`ProcessAction::destroy`].
    Interrupted,
}

/// Errors raised while supervising a child process.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The operation is not valid in the current state.
    #[error("cannot {operation} process '{name}' while it is {status}")]
    IllegalState {
        /// Template name.
        name: String,
        /// Attempted operation.
        operation: &'static str,
        /// State at the time of the call.
        status: ActionStatus,
    },
    /// The resolved command line has no program.
    #[error("process '{name}' resolved to an empty command line")]
    EmptyCommand {
        /// Template name.
        name: String,
    },
    /// The OS refused to spawn the program.
    #[error("failed to start '{program}' for process '{name}': {source}")]
    Spawn {
        /// Template name.
        name: String,
        /// Program that was spawned.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A reader thread could not be created.
    #[error("failed to start {stream} reader for process '{name}': {source}")]
    Reader {
        /// Template name.
        name: String,
        /// `stdout` or `stderr`.
        stream: &'static str,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Polling the child failed.
    #[error("failed to poll process '{name}': {source}")]
    Wait {
        /// Template name.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Killing the child failed.
    #[error("failed to kill process '{name}': {source}")]
    Kill {
        /// Template name.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Fully resolved command to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    name: String,
    program: String,
    args: Vec<String>,
    environment: Option<BTreeMap<String, String>>,
    directory: Option<PathBuf>,
}

impl LaunchSpec {
    /// Builds a launch from an argv list; the first token is the program.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::EmptyCommand`] when `argv` is empty.
    pub fn new(name: impl Into<String>, argv: Vec<String>) -> Result<Self, ActionError> {
        let name = name.into();
        let mut tokens = argv.into_iter();
        let Some(program) = tokens.next().filter(|program| !program.is_empty()) else {
            return Err(ActionError::EmptyCommand { name });
        };
        Ok(Self {
            name,
            program,
            args: tokens.collect(),
            environment: None,
            directory: None,
        })
    }

    /// Adds variables on top of the inherited environment.
    #[must_use]
    pub fn with_environment(mut self, environment: BTreeMap<String, String>) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Template name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Program to execute.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments after the program.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Extra environment variables, if any.
    #[must_use]
    pub const fn environment(&self) -> Option<&BTreeMap<String, String>> {
        self.environment.as_ref()
    }

    /// Working directory, if any.
    #[must_use]
    pub fn directory(&self) -> Option<&std::path::Path> {
        self.directory.as_deref()
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(environment) = &self.environment {
            command.envs(environment);
        }
        if let Some(directory) = &self.directory {
            command.current_dir(directory);
        }
        command
    }
}

/// One supervised child process with bounded output capture.
pub struct ProcessAction {
    launch: LaunchSpec,
    status: ActionStatus,
    exit_code: Option<i32>,
    child: Option<Child>,
    readers: Vec<JoinHandle<()>>,
    stdout: Arc<OutputBuffer>,
    stderr: Arc<OutputBuffer>,
}

impl fmt::Debug for ProcessAction {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ProcessAction")
            .field("name", &self.launch.name)
            .field("program", &self.launch.program)
            .field("status", &self.status)
            .field("exit_code", &self.exit_code)
            .field("pid", &self.pid())
            .finish_non_exhaustive()
    }
}

impl ProcessAction {
    /// Creates an action whose buffers each keep at most `ceiling` bytes.
    #[must_use]
    pub fn new(launch: LaunchSpec, ceiling: usize) -> Self {
        Self {
            launch,
            status: ActionStatus::NotStarted,
            exit_code: None,
            child: None,
            readers: Vec::with_capacity(2),
            stdout: Arc::new(OutputBuffer::new(ceiling)),
            stderr: Arc::new(OutputBuffer::new(ceiling)),
        }
    }

    /// Template name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.launch.name()
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn status(&self) -> ActionStatus {
        self.status
    }

    /// Exit code, recorded once the child is observed to finish.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// OS process id while a child is attached.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    fn illegal(&self, operation: &'static str) -> ActionError {
        ActionError::IllegalState {
            name: self.launch.name.clone(),
            operation,
            status: self.status,
        }
    }

    /// Spawns the child and its output readers.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::IllegalState`] unless the action is
    /// [`ActionStatus::NotStarted`], and [`ActionError::Spawn`] when the OS
    /// refuses the program (the action becomes
    /// [`ActionStatus::FailedToStart`]).
    pub fn start(&mut self) -> Result<(), ActionError> {
        if self.status != ActionStatus::NotStarted {
            return Err(self.illegal("start"));
        }

        let mut child = match self.launch.command().spawn() {
            Ok(child) => child,
            Err(source) => {
                self.status = ActionStatus::FailedToStart;
                warn!(
                    target: ACTION_TARGET,
                    process = %self.launch.name,
                    program = %self.launch.program,
                    error = %source,
                    "failed to spawn process"
                );
                return Err(ActionError::Spawn {
                    name: self.launch.name.clone(),
                    program: self.launch.program.clone(),
                    source,
                });
            }
        };

        debug!(
            target: ACTION_TARGET,
            process = %self.launch.name,
            program = %self.launch.program,
            pid = child.id(),
            "spawned process"
        );

        let readers = match self.attach_readers(&mut child) {
            Ok(readers) => readers,
            Err(error) => {
                kill_and_reap(&mut child);
                self.status = ActionStatus::FailedToStart;
                return Err(error);
            }
        };

        self.readers = readers;
        self.child = Some(child);
        self.status = ActionStatus::Started;
        Ok(())
    }

    fn attach_readers(&self, child: &mut Child) -> Result<Vec<JoinHandle<()>>, ActionError> {
        let mut readers = Vec::with_capacity(2);
        if let Some(pipe) = child.stdout.take() {
            readers.push(self.spawn_reader("stdout", pipe, &self.stdout)?);
        }
        if let Some(pipe) = child.stderr.take() {
            readers.push(self.spawn_reader("stderr", pipe, &self.stderr)?);
        }
        Ok(readers)
    }

    fn spawn_reader<R>(
        &self,
        stream: &'static str,
        pipe: R,
        sink: &Arc<OutputBuffer>,
    ) -> Result<JoinHandle<()>, ActionError>
    where
        R: Read + Send + 'static,
    {
        let process = self.launch.name.clone();
        let sink = Arc::clone(sink);
        thread::Builder::new()
            .name(format!("procd-{stream}"))
            .spawn(move || pump(&process, stream, pipe, &sink))
            .map_err(|source| ActionError::Reader {
                name: self.launch.name.clone(),
                stream,
                source,
            })
    }

    /// Waits up to `timeout` for the child to exit.
    ///
    /// Returns `Some(exit_code)` once finished and `None` when the timeout
    /// elapses first. Calls after the child finished return the recorded
    /// code immediately.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::IllegalState`] when the action never started or
    /// was destroyed, and [`ActionError::Wait`] when polling fails.
    pub fn wait_for(&mut self, timeout: Duration) -> Result<Option<i32>, ActionError> {
        if self.status == ActionStatus::Finished {
            return Ok(self.exit_code);
        }
        if self.status != ActionStatus::Started {
            return Err(self.illegal("wait for"));
        }
        let Some(child) = self.child.as_mut() else {
            return Err(self.illegal("wait for"));
        };

        let deadline = Instant::now() + timeout;
        loop {
            let polled = child.try_wait().map_err(|source| ActionError::Wait {
                name: self.launch.name.clone(),
                source,
            })?;
            if let Some(exit) = polled {
                let code = exit_code_of(exit);
                debug!(
                    target: ACTION_TARGET,
                    process = %self.launch.name,
                    exit_code = code,
                    "process finished"
                );
                self.status = ActionStatus::Finished;
                self.exit_code = Some(code);
                return Ok(Some(code));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(WAIT_TICK.min(deadline - now));
        }
    }

    /// Drains stdout captured since the previous call.
    #[must_use]
    pub fn stdout_text(&self) -> String {
        self.stdout.drain_text()
    }

    /// Drains stderr captured since the previous call.
    #[must_use]
    pub fn stderr_text(&self) -> String {
        self.stderr.drain_text()
    }

    /// Joins the readers and returns the remaining stdout followed by the
    /// remaining stderr.
    ///
    /// Call after the child exited or was destroyed. A reader whose pipe is
    /// still held open by a grandchild is given a short grace period and
    /// then left detached.
    pub fn finish_output(&mut self) -> String {
        let deadline = Instant::now() + READER_GRACE;
        for reader in self.readers.drain(..) {
            while !reader.is_finished() && Instant::now() < deadline {
                thread::sleep(WAIT_TICK);
            }
            if !reader.is_finished() {
                debug!(
                    target: ACTION_TARGET,
                    process = %self.launch.name,
                    "output pipe still open after exit; detaching reader"
                );
            } else if reader.join().is_err() {
                warn!(
                    target: ACTION_TARGET,
                    process = %self.launch.name,
                    "output reader panicked"
                );
            }
        }
        let mut text = self.stdout.drain_all();
        text.push_str(&self.stderr.drain_all());
        text
    }

    /// Kills and reaps a running child.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::IllegalState`] unless the action is
    /// [`ActionStatus::Started`], and [`ActionError::Kill`] when the signal
    /// cannot be delivered.
    pub fn destroy(&mut self) -> Result<(), ActionError> {
        if self.status != ActionStatus::Started {
            return Err(self.illegal("destroy"));
        }
        let Some(child) = self.child.as_mut() else {
            return Err(self.illegal("destroy"));
        };
        child.kill().map_err(|source| ActionError::Kill {
            name: self.launch.name.clone(),
            source,
        })?;
        if let Err(error) = child.wait() {
            warn!(
                target: ACTION_TARGET,
                process = %self.launch.name,
                %error,
                "failed to reap killed process"
            );
        }
        debug!(
            target: ACTION_TARGET,
            process = %self.launch.name,
            "process destroyed"
        );
        self.status = ActionStatus::Interrupted;
        Ok(())
    }
}

impl Drop for ProcessAction {
    fn drop(&mut self) {
        if self.status == ActionStatus::Started
            && let Some(child) = self.child.as_mut()
        {
            kill_and_reap(child);
        }
    }
}

fn pump(process: &str, stream: &'static str, mut pipe: impl Read, sink: &OutputBuffer) {
    let mut chunk = [0_u8; READ_CHUNK];
    loop {
        match pipe.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => sink.append(&chunk[..read]),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => {
                debug!(
                    target: ACTION_TARGET,
                    process,
                    stream,
                    %error,
                    "output reader stopped"
                );
                break;
            }
        }
    }
}

fn kill_and_reap(child: &mut Child) {
    if child.kill().is_ok() {
        let _reaped = child.wait();
    }
}

fn exit_code_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or(SIGNALLED_EXIT_CODE)
}

#[cfg(all(test, unix))]
mod tests;
