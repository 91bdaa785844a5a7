//! Turns process requests into supervised processes and results.
//!
//! The dispatcher never fails: every problem, from an unknown template to a
//! spawn failure, is reported as a result with status `error`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use procd_protocol::{Handle, ProcessRequest, ProcessResult};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::action::{ActionError, ActionKinds, ProcessAction};
use crate::context::ExecutionContext;
use crate::handles::HandleRegistry;
use crate::resolver::ResolverRegistry;
use crate::template::{TemplateError, TemplateRegistry};

const DISPATCH_TARGET: &str = "procd_exec::dispatcher";

/// Default poll slice while waiting for a process.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
enum DispatchError {
    #[error("unknown process template '{name}'")]
    UnknownTemplate { name: String },
    #[error("process template '{name}' uses unregistered kind '{kind}'")]
    UnknownKind { name: String, kind: String },
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Action(#[from] ActionError),
}

/// Runs templates and tracks detached processes.
#[derive(Debug)]
pub struct Dispatcher {
    templates: TemplateRegistry,
    resolvers: ResolverRegistry,
    kinds: ActionKinds,
    handles: Arc<HandleRegistry>,
    defaults: BTreeMap<String, String>,
    poll_interval: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher with the built-in resolvers and kinds.
    #[must_use]
    pub fn new(templates: TemplateRegistry, handles: Arc<HandleRegistry>) -> Self {
        Self {
            templates,
            resolvers: ResolverRegistry::default(),
            kinds: ActionKinds::default(),
            handles,
            defaults: BTreeMap::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Replaces the resolver registry.
    #[must_use]
    pub fn with_resolvers(mut self, resolvers: ResolverRegistry) -> Self {
        self.resolvers = resolvers;
        self
    }

    /// Replaces the registered process kinds.
    #[must_use]
    pub fn with_kinds(mut self, kinds: ActionKinds) -> Self {
        self.kinds = kinds;
        self
    }

    /// Sets daemon-wide context defaults.
    #[must_use]
    pub fn with_defaults(mut self, defaults: BTreeMap<String, String>) -> Self {
        self.defaults = defaults;
        self
    }

    /// Sets the poll slice; zero is raised to one millisecond.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    /// Loaded templates.
    #[must_use]
    pub const fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    /// Registry holding detached processes.
    #[must_use]
    pub fn handles(&self) -> &HandleRegistry {
        &self.handles
    }

    /// Largest result text a dispatch returns: one full buffer per stream.
    #[must_use]
    pub const fn result_text_limit(&self) -> usize {
        self.kinds.ceiling().saturating_mul(2)
    }

    /// Runs the template named by `request` within its wait budget.
    pub fn dispatch(&self, request: &ProcessRequest) -> ProcessResult {
        let name = request.name();
        match self.run(request) {
            Ok(result) => {
                info!(
                    target: DISPATCH_TARGET,
                    process = name,
                    status = %result.status(),
                    result_code = result.result_code(),
                    "process request completed"
                );
                result
            }
            Err(error) => {
                warn!(
                    target: DISPATCH_TARGET,
                    process = name,
                    %error,
                    "process request failed"
                );
                ProcessResult::error(name, &error.to_string())
            }
        }
    }

    fn run(&self, request: &ProcessRequest) -> Result<ProcessResult, DispatchError> {
        let name = request.name();
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| DispatchError::UnknownTemplate {
                name: name.to_owned(),
            })?;
        let context = ExecutionContext::merged(&self.defaults, request.parameters());
        let launch = template.launch(&context, &self.resolvers)?;
        debug!(
            target: DISPATCH_TARGET,
            process = name,
            program = launch.program(),
            args = ?launch.args(),
            environment = ?launch.environment().map(BTreeMap::len),
            directory = ?launch.directory(),
            "resolved process template"
        );
        let mut action =
            self.kinds
                .create(template.kind(), launch)
                .ok_or_else(|| DispatchError::UnknownKind {
                    name: name.to_owned(),
                    kind: template.kind().to_owned(),
                })?;
        action.start()?;

        let deadline = Instant::now() + request.wait_budget();
        let limit = self.result_text_limit();
        let mut output = String::new();
        loop {
            let slice = deadline
                .saturating_duration_since(Instant::now())
                .min(self.poll_interval);
            if let Some(exit_code) = action.wait_for(slice)? {
                append_newest(&mut output, &action.finish_output(), limit);
                return Ok(ProcessResult::finished(name, exit_code, &output));
            }
            append_newest(&mut output, &action.stdout_text(), limit);
            append_newest(&mut output, &action.stderr_text(), limit);
            if Instant::now() >= deadline {
                break;
            }
        }

        if request.terminate() {
            action.destroy()?;
            append_newest(&mut output, &action.finish_output(), limit);
            return Ok(ProcessResult::terminated(name, &output));
        }
        let handle = self.handles.store(action);
        Ok(ProcessResult::started(name, handle, &output))
    }

    /// Waits once for a detached process.
    ///
    /// The handle is redeemed whatever the outcome: a process still running
    /// after `timeout` is killed and reported as `terminated`.
    pub fn wait_for_handle(&self, handle: Handle, timeout: Duration) -> ProcessResult {
        let Some(mut action) = self.handles.remove(handle) else {
            warn!(target: DISPATCH_TARGET, %handle, "unknown process handle");
            return ProcessResult::error("", &format!("unknown process handle {handle}"));
        };
        let result = match Self::redeem(&mut action, timeout) {
            Ok(result) => result,
            Err(error) => {
                if action.destroy().is_err() {
                    debug!(
                        target: DISPATCH_TARGET,
                        %handle,
                        "process already stopped"
                    );
                }
                ProcessResult::error(action.name(), &error.to_string())
            }
        };
        info!(
            target: DISPATCH_TARGET,
            %handle,
            process = result.name(),
            status = %result.status(),
            "redeemed process handle"
        );
        result
    }

    fn redeem(action: &mut ProcessAction, timeout: Duration) -> Result<ProcessResult, ActionError> {
        if let Some(exit_code) = action.wait_for(timeout)? {
            let output = action.finish_output();
            return Ok(ProcessResult::finished(action.name(), exit_code, &output));
        }
        action.destroy()?;
        let output = action.finish_output();
        Ok(ProcessResult::terminated(action.name(), &output))
    }
}

/// Appends `text`, then drops the oldest characters beyond `limit` bytes.
fn append_newest(output: &mut String, text: &str, limit: usize) {
    output.push_str(text);
    if output.len() <= limit {
        return;
    }
    let mut cut = output.len() - limit;
    while !output.is_char_boundary(cut) {
        cut += 1;
    }
    output.drain(..cut);
}
