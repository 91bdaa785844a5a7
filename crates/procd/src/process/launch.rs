//! Supervises daemon launch sequencing and runtime orchestration.

use std::sync::Arc;

use camino::Utf8Path;
use procd_config::ConfigOverrides;
use procd_protocol::CommandHandler;
use tracing::{info, warn};

use crate::bootstrap::{ConfigLoader, FileConfigLoader, bootstrap_with};
use crate::dispatch::ProtocolConnectionHandler;
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::transport::TcpSocketListener;

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Collaborators required to launch the daemon runtime.
pub(crate) struct LaunchPlan<L, S> {
    pub(crate) loader: L,
    pub(crate) reporter: Arc<dyn HealthReporter>,
    pub(crate) shutdown: S,
}

/// Runs the daemon using the production collaborators.
///
/// Blocks until one of [`super::TERMINATION_SIGNALS`] arrives.
///
/// # Errors
///
/// Returns a [`LaunchError`] when signal installation, bootstrap or
/// binding fails.
pub fn run_daemon(config_path: &Utf8Path, overrides: ConfigOverrides) -> Result<(), LaunchError> {
    let plan = LaunchPlan {
        loader: FileConfigLoader::new(config_path, overrides),
        reporter: Arc::new(StructuredHealthReporter::new()),
        shutdown: SystemShutdownSignal::install()?,
    };
    run_daemon_with(plan)
}

/// Runs the daemon with injected collaborators.
pub(crate) fn run_daemon_with<L, S>(plan: LaunchPlan<L, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal,
{
    let LaunchPlan {
        loader,
        reporter,
        shutdown,
    } = plan;

    info!(target: PROCESS_TARGET, "starting daemon runtime");
    let daemon = bootstrap_with(&loader, Arc::clone(&reporter))?;
    let config = daemon.config();
    let listener = TcpSocketListener::bind(config.host(), config.port())?;
    let address = listener.local_addr();

    let local = daemon.handler();
    let handler: Arc<dyn CommandHandler> = local.clone();
    let connections = ProtocolConnectionHandler::new(handler, config.ip_filter().clone())
        .with_read_timeout(config.read_timeout());
    let listener_handle = listener.start(Arc::new(connections))?;
    reporter.listener_started(address);

    let waited = shutdown.wait();
    match &waited {
        Ok(trigger) => info!(target: PROCESS_TARGET, %trigger, "stopping listener"),
        Err(error) => warn!(
            target: PROCESS_TARGET,
            %error,
            "shutdown wait failed, stopping listener"
        ),
    }
    listener_handle.shutdown();
    let joined = listener_handle.join();
    reporter.listener_stopped();
    let discarded = local.dispatcher().handles().clear();
    waited?;
    joined?;
    info!(
        target: PROCESS_TARGET,
        discarded,
        "shutdown sequence completed"
    );
    Ok(())
}
