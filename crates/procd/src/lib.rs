//! The procd process-execution daemon.
//!
//! The daemon listens on a TCP port and serves one framed request per
//! connection: file operations below a configured root and process template
//! execution through [`procd_exec::Dispatcher`]. Startup follows a fixed
//! sequence: load configuration, install structured telemetry, load process
//! templates, bind the listener and block until a termination signal
//! arrives. Health reporting hooks emit structured events at each stage.
//!
//! Detached processes live only as long as the daemon; they are killed when
//! it shuts down.

mod bootstrap;
mod dispatch;
mod health;
mod process;
mod telemetry;
mod transport;

#[cfg(test)]
mod test_support;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, FileConfigLoader, StaticConfigLoader, bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{
    LaunchError, ShutdownError, ShutdownSignal, ShutdownTrigger, SystemShutdownSignal,
    TERMINATION_SIGNALS, run_daemon,
};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::ListenerError;
