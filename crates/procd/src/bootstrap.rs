//! Daemon bootstrap orchestration.

use std::fmt;
use std::sync::Arc;

use camino::Utf8PathBuf;
use procd_config::{Config, ConfigError, ConfigOverrides};
use procd_exec::{
    ActionKinds, Dispatcher, HandleRegistry, LocalCommandHandler, ResolverRegistry,
    TemplateError, TemplateRegistry, VirtualRoot,
};
use thiserror::Error;

use crate::health::HealthReporter;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] raised while reading or validating the
    /// configuration.
    fn load(&self) -> Result<Config, ConfigError>;
}

/// Loader that reads a configuration file and applies CLI overrides.
#[derive(Debug, Clone)]
pub struct FileConfigLoader {
    path: Utf8PathBuf,
    overrides: ConfigOverrides,
}

impl FileConfigLoader {
    /// Reads `path` and layers `overrides` on top.
    pub fn new(path: impl Into<Utf8PathBuf>, overrides: ConfigOverrides) -> Self {
        Self {
            path: path.into(),
            overrides,
        }
    }
}

impl ConfigLoader for FileConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        Config::load(&self.path, &self.overrides)
    }
}

/// Loader that always returns the same configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already validated configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Box<ConfigError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The process template file could not be loaded.
    #[error("failed to load process templates: {source}")]
    Templates {
        /// Underlying template error.
        #[source]
        source: Box<TemplateError>,
    },
}

/// Result of a successful bootstrap invocation.
pub struct Daemon {
    config: Config,
    handler: Arc<LocalCommandHandler>,
    telemetry: TelemetryHandle,
}

impl fmt::Debug for Daemon {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Daemon")
            .field("config", &self.config)
            .field("telemetry", &self.telemetry)
            .finish_non_exhaustive()
    }
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Command handler serving the configured root and templates.
    #[must_use]
    pub fn handler(&self) -> Arc<LocalCommandHandler> {
        Arc::clone(&self.handler)
    }
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// # Errors
///
/// Returns a [`BootstrapError`] when configuration, telemetry or template
/// loading fails; the reporter sees the same error first.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration {
                source: Box::new(source),
            };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let (handler, templates) = match build_handler(&config) {
        Ok(built) => built,
        Err(source) => {
            let error = BootstrapError::Templates {
                source: Box::new(source),
            };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    reporter.bootstrap_succeeded(&config, templates);
    Ok(Daemon {
        config,
        handler: Arc::new(handler),
        telemetry,
    })
}

fn build_handler(config: &Config) -> Result<(LocalCommandHandler, usize), TemplateError> {
    let kinds = ActionKinds::builtin(config.output_ceiling());
    let resolvers = ResolverRegistry::default();
    let templates = TemplateRegistry::load(config.procdef_path(), &kinds, &resolvers)?;
    let count = templates.len();
    let dispatcher = Dispatcher::new(templates, Arc::new(HandleRegistry::new()))
        .with_resolvers(resolvers)
        .with_kinds(kinds)
        .with_defaults(config.procenv().clone())
        .with_poll_interval(config.poll_interval());
    let root = VirtualRoot::new(config.path_root().to_path_buf());
    Ok((LocalCommandHandler::new(root, Arc::new(dispatcher)), count))
}
