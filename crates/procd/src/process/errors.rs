//! Error surface for launching and running the daemon.

use thiserror::Error;

use crate::bootstrap::BootstrapError;
use crate::transport::ListenerError;

use super::shutdown::ShutdownError;

/// Errors surfaced while launching or supervising the daemon process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrap failed before the listener was bound.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// The listener could not be bound or stopped cleanly.
    #[error("listener failure: {0}")]
    Listener(#[from] ListenerError),
    /// Waiting for a shutdown signal failed.
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}
