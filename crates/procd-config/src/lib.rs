//! Configuration for the procd daemon.
//!
//! Settings come from a TOML document whose path is given on the command
//! line (`conf/procd.toml` by default). Scalar settings can be overridden by
//! `PROCD_*` environment variables and then by command-line flags through
//! `ortho_config`. Every failure is reported as a typed [`ConfigError`] so
//! the daemon can refuse to start.

mod config;
mod defaults;
mod filter;
mod layers;
mod logging;

pub use self::config::{Config, ConfigError};
pub use self::defaults::{
    DEFAULT_CONFIG_PATH, DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_OUTPUT_CEILING_BYTES,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_PROCDEF_FILENAME, DEFAULT_READ_TIMEOUT_MS,
};
pub use self::filter::{IpFilter, IpFilterError};
pub use self::layers::ConfigOverrides;
pub use self::logging::{LogFormat, LogFormatParseError};
