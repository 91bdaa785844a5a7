//! Loading and validation of the daemon configuration file.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoError;
use serde::Deserialize;
use thiserror::Error;

use crate::defaults::{
    DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_OUTPUT_CEILING_BYTES, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_PROCDEF_FILENAME, DEFAULT_READ_TIMEOUT_MS,
};
use crate::filter::{IpFilter, IpFilterError};
use crate::layers::{ConfigOverrides, Settings};
use crate::logging::LogFormat;

/// Errors raised while loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        /// Path that was read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        /// Path that was parsed.
        path: Utf8PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },
    /// Merging the file with the environment and flags failed.
    #[error("failed to layer configuration from {path}: {source}")]
    Layering {
        /// Configuration file that was layered.
        path: Utf8PathBuf,
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// A `procenv` entry is neither a scalar nor a table.
    #[error("procenv.{name} must be a string, number, boolean or table")]
    ProcenvValue {
        /// Dotted name of the offending entry.
        name: String,
    },
    /// A required key is absent.
    #[error("configuration key '{key}' is required")]
    MissingKey {
        /// Name of the key as written in the file.
        key: &'static str,
    },
    /// `pathRoot` does not name an existing directory.
    #[error("pathRoot {path} is not an existing directory")]
    PathRootNotDirectory {
        /// Resolved root path.
        path: Utf8PathBuf,
    },
    /// `remoteIPFilter` contains an entry that is not an address.
    #[error("invalid remoteIPFilter: {0}")]
    IpFilter(#[from] IpFilterError),
    /// A numeric setting is out of range.
    #[error("configuration key '{key}' is invalid: {reason}")]
    InvalidValue {
        /// Name of the key as written in the file.
        key: &'static str,
        /// Why the value was rejected.
        reason: &'static str,
    },
}

/// File-only keys; the scalar settings are layered by [`Settings`].
#[derive(Debug, Deserialize)]
struct FileLocations {
    #[serde(rename = "pathRoot")]
    path_root: Option<Utf8PathBuf>,
    #[serde(rename = "procDefFilename")]
    procdef_filename: Option<Utf8PathBuf>,
    #[serde(rename = "remoteIPFilter")]
    remote_ip_filter: Option<String>,
    #[serde(default)]
    procenv: toml::Table,
}

/// Validated daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    host: String,
    port: u16,
    path_root: Utf8PathBuf,
    procdef_path: Utf8PathBuf,
    ip_filter: IpFilter,
    log_filter: String,
    log_format: LogFormat,
    poll_interval: Duration,
    read_timeout: Duration,
    output_ceiling: usize,
    procenv: BTreeMap<String, String>,
}

impl Config {
    /// Reads and validates the file at `path`.
    ///
    /// Scalar settings are layered: built-in defaults, then the file, then
    /// `PROCD_*` environment variables (`PROCD_PORT`, `PROCD_LOG_FILTER`,
    /// ...), then `overrides`. Relative `pathRoot` and `procDefFilename`
    /// values resolve against the directory containing the file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the file is missing, unparsable or
    /// fails validation.
    pub fn load(path: &Utf8Path, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let locations: FileLocations =
            toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let settings =
            Settings::layered(path, overrides).map_err(|source| ConfigError::Layering {
                path: path.to_path_buf(),
                source,
            })?;
        let base = match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };
        Self::from_layers(settings, locations, base)
    }

    fn from_layers(
        settings: Settings,
        locations: FileLocations,
        base: &Utf8Path,
    ) -> Result<Self, ConfigError> {
        let port = settings
            .port
            .ok_or(ConfigError::MissingKey { key: "port" })?;

        let path_root = locations
            .path_root
            .map(|root| base.join(root))
            .ok_or(ConfigError::MissingKey { key: "pathRoot" })?;
        if !path_root.is_dir() {
            return Err(ConfigError::PathRootNotDirectory { path: path_root });
        }

        let procdef_path = base.join(
            locations
                .procdef_filename
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_PROCDEF_FILENAME)),
        );

        let ip_filter = match locations.remote_ip_filter.as_deref() {
            Some(list) => IpFilter::parse(list)?,
            None => IpFilter::default(),
        };

        let poll_interval_ms = positive(
            "poll_interval_ms",
            settings.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        )?;
        let read_timeout_ms = positive(
            "read_timeout_ms",
            settings.read_timeout_ms.unwrap_or(DEFAULT_READ_TIMEOUT_MS),
        )?;
        let output_ceiling = settings
            .output_ceiling_bytes
            .unwrap_or(DEFAULT_OUTPUT_CEILING_BYTES);
        if output_ceiling == 0 {
            return Err(ConfigError::InvalidValue {
                key: "output_ceiling_bytes",
                reason: "must be greater than zero",
            });
        }

        let mut procenv = BTreeMap::new();
        flatten_procenv(None, locations.procenv, &mut procenv)?;

        Ok(Self {
            host: settings.host.unwrap_or_else(|| DEFAULT_HOST.to_owned()),
            port,
            path_root,
            procdef_path,
            ip_filter,
            log_filter: settings
                .log_filter
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_owned()),
            log_format: settings.log_format.unwrap_or_default(),
            poll_interval: Duration::from_millis(poll_interval_ms),
            read_timeout: Duration::from_millis(read_timeout_ms),
            output_ceiling,
            procenv,
        })
    }

    /// Bind host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Listening port; `0` asks the OS for an ephemeral port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Directory all virtual paths resolve against.
    #[must_use]
    pub fn path_root(&self) -> &Utf8Path {
        &self.path_root
    }

    /// Location of the process template file.
    #[must_use]
    pub fn procdef_path(&self) -> &Utf8Path {
        &self.procdef_path
    }

    /// Allowed peers.
    #[must_use]
    pub const fn ip_filter(&self) -> &IpFilter {
        &self.ip_filter
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Dispatcher poll slice.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Read timeout for accepted connections.
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Ceiling of each process output buffer, in bytes.
    #[must_use]
    pub const fn output_ceiling(&self) -> usize {
        self.output_ceiling
    }

    /// Daemon-wide execution context defaults.
    #[must_use]
    pub const fn procenv(&self) -> &BTreeMap<String, String> {
        &self.procenv
    }
}

fn positive(key: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key,
            reason: "must be greater than zero",
        });
    }
    Ok(value)
}

/// Nested tables become dotted names, so `procenv.app.home` defines
/// `app.home`.
fn flatten_procenv(
    prefix: Option<&str>,
    table: toml::Table,
    into: &mut BTreeMap<String, String>,
) -> Result<(), ConfigError> {
    for (key, value) in table {
        let name = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key,
        };
        let text = match value {
            toml::Value::String(text) => text,
            toml::Value::Integer(number) => number.to_string(),
            toml::Value::Float(number) => number.to_string(),
            toml::Value::Boolean(flag) => flag.to_string(),
            toml::Value::Table(nested) => {
                flatten_procenv(Some(&name), nested, into)?;
                continue;
            }
            toml::Value::Array(_) | toml::Value::Datetime(_) => {
                return Err(ConfigError::ProcenvValue { name });
            }
        };
        into.insert(name, text);
    }
    Ok(())
}
