//! Process execution for the procd daemon.
//!
//! Requests name a process template. The [`Dispatcher`] resolves the
//! template against an [`ExecutionContext`], launches a [`ProcessAction`]
//! and waits for it within the caller's budget. Processes that outlive the
//! budget are either killed or parked in the [`HandleRegistry`] so the
//! caller can poll them later. [`LocalCommandHandler`] exposes all of this,
//! plus the virtual filesystem commands, through the shared
//! [`procd_protocol::CommandHandler`] contract.

mod action;
mod context;
mod dispatcher;
mod handles;
mod local;
mod resolver;
mod template;

pub use self::action::{
    ActionError, ActionFactory, ActionKinds, ActionStatus, DEFAULT_OUTPUT_CEILING, LaunchSpec,
    OS_COMMAND_KIND, ProcessAction,
};
pub use self::context::ExecutionContext;
pub use self::dispatcher::{DEFAULT_POLL_INTERVAL, Dispatcher};
pub use self::handles::HandleRegistry;
pub use self::local::{LocalCommandHandler, VirtualRoot};
pub use self::resolver::{
    CONTEXT_RESOLVER, ContextResolver, DEFAULT_RESOLVER, LITERAL_RESOLVER, LiteralResolver,
    ResolvableValue, ResolveError, ResolverRegistry, TemplateResolver, ValueResolver,
};
pub use self::template::{
    CommandLines, OsFamily, ParameterDefinition, ProcessTemplate, TemplateError,
    TemplateRegistry,
};

#[cfg(all(test, unix))]
mod tests;
