/// Configuration file read when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "conf/procd.toml";

/// Template file name, resolved next to the configuration file.
pub const DEFAULT_PROCDEF_FILENAME: &str = "procdef.toml";

/// Bind address used when `host` is absent.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Length of one dispatcher poll slice.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Read timeout applied to accepted connections.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 30_000;

/// Ceiling of each process output buffer.
pub const DEFAULT_OUTPUT_CEILING_BYTES: usize = 64 * 1024;
