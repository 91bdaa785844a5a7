//! Daemon runtime: launch sequencing and shutdown handling.

mod errors;
pub(crate) mod launch;
pub(crate) mod shutdown;

pub use errors::LaunchError;
pub use launch::run_daemon;
pub use shutdown::{
    ShutdownError, ShutdownSignal, ShutdownTrigger, SystemShutdownSignal, TERMINATION_SIGNALS,
};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
