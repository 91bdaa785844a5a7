//! Termination signal handling.
//!
//! Handlers are installed before bootstrap so a signal that arrives while
//! the daemon is still starting is queued rather than killing the process.

use std::fmt;
use std::io;
use std::sync::{Mutex, PoisonError};

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;

/// Signals that stop the daemon.
pub const TERMINATION_SIGNALS: [i32; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Blocks the launch sequence until the daemon should stop.
pub trait ShutdownSignal: Send + Sync {
    /// Blocks until shutdown should proceed and reports what triggered it.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError`] when the notification source fails.
    fn wait(&self) -> Result<ShutdownTrigger, ShutdownError>;
}

/// Reason the shutdown wait returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// One of [`TERMINATION_SIGNALS`] arrived.
    Signal(i32),
    /// The notification source closed without a signal.
    Closed,
}

impl fmt::Display for ShutdownTrigger {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Signal(SIGTERM) => formatter.write_str("SIGTERM"),
            Self::Signal(SIGINT) => formatter.write_str("SIGINT"),
            Self::Signal(SIGQUIT) => formatter.write_str("SIGQUIT"),
            Self::Signal(SIGHUP) => formatter.write_str("SIGHUP"),
            Self::Signal(other) => write!(formatter, "signal {other}"),
            Self::Closed => formatter.write_str("signal source closed"),
        }
    }
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Waits for [`TERMINATION_SIGNALS`] through `signal-hook`.
pub struct SystemShutdownSignal {
    signals: Mutex<Signals>,
}

impl fmt::Debug for SystemShutdownSignal {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SystemShutdownSignal")
            .field("signals", &TERMINATION_SIGNALS)
            .finish_non_exhaustive()
    }
}

impl SystemShutdownSignal {
    /// Registers handlers for [`TERMINATION_SIGNALS`]; signals are queued
    /// from this point on.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError::Install`] when registration fails.
    pub fn install() -> Result<Self, ShutdownError> {
        let signals =
            Signals::new(TERMINATION_SIGNALS).map_err(|source| ShutdownError::Install { source })?;
        Ok(Self {
            signals: Mutex::new(signals),
        })
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<ShutdownTrigger, ShutdownError> {
        let mut signals = self.signals.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(signals
            .forever()
            .next()
            .map_or(ShutdownTrigger::Closed, ShutdownTrigger::Signal))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use signal_hook::low_level::raise;

    use super::*;

    #[rstest]
    #[case::term(ShutdownTrigger::Signal(SIGTERM), "SIGTERM")]
    #[case::hup(ShutdownTrigger::Signal(SIGHUP), "SIGHUP")]
    #[case::closed(ShutdownTrigger::Closed, "signal source closed")]
    fn triggers_name_their_cause(#[case] trigger: ShutdownTrigger, #[case] expected: &str) {
        assert_eq!(trigger.to_string(), expected);
    }

    #[test]
    fn queued_signals_end_the_wait() {
        let shutdown = SystemShutdownSignal::install().expect("install handlers");
        raise(SIGHUP).expect("raise SIGHUP");
        assert_eq!(
            shutdown.wait().expect("wait"),
            ShutdownTrigger::Signal(SIGHUP)
        );
    }
}
