//! Scalar settings merged from defaults, the file, `PROCD_*` variables and
//! command-line flags, in increasing precedence.

use std::ffi::OsString;
use std::sync::Arc;

use camino::Utf8Path;
use clap::Args;
use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

use crate::logging::LogFormat;

/// Command-line overrides applied on top of the file and environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub struct ConfigOverrides {
    /// Port to listen on instead of the configured one.
    #[arg(long)]
    pub port: Option<u16>,
    /// Tracing filter expression, for example `procd=debug`.
    #[arg(long)]
    pub log_filter: Option<String>,
    /// Log output format.
    #[arg(long)]
    pub log_format: Option<LogFormat>,
}

impl ConfigOverrides {
    /// Argument vector handed to the layered loader: the config file first,
    /// then only the flags that were given.
    pub(crate) fn loader_arguments(&self, path: &Utf8Path) -> Vec<OsString> {
        let mut arguments = vec![
            OsString::from(env!("CARGO_PKG_NAME")),
            OsString::from("--config-path"),
            OsString::from(path.as_str()),
        ];
        if let Some(port) = self.port {
            arguments.push(OsString::from("--port"));
            arguments.push(OsString::from(port.to_string()));
        }
        if let Some(filter) = &self.log_filter {
            arguments.push(OsString::from("--log-filter"));
            arguments.push(OsString::from(filter));
        }
        if let Some(format) = self.log_format {
            arguments.push(OsString::from("--log-format"));
            arguments.push(OsString::from(format.to_string()));
        }
        arguments
    }
}

/// Settings that may come from any layer.
///
/// Keys naming files or directories are file-only and not listed here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "PROCD")]
pub struct Settings {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub log_filter: Option<String>,
    pub log_format: Option<LogFormat>,
    pub poll_interval_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    pub output_ceiling_bytes: Option<usize>,
}

impl Settings {
    pub(crate) fn layered(
        path: &Utf8Path,
        overrides: &ConfigOverrides,
    ) -> Result<Self, Arc<OrthoError>> {
        Self::load_from_iter(overrides.loader_arguments(path))
    }
}
