//! Shared fixtures for daemon tests.

use std::fs;
use std::net::SocketAddr;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use mockall::mock;
use procd_config::{Config, ConfigOverrides};
use procd_protocol::{CommandError, CommandHandler, Handle, ProcessRequest, ProcessResult};
use tempfile::TempDir;

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;

mock! {
    pub Handler {}
    impl CommandHandler for Handler {
        fn get(&self, path: &str) -> Result<String, CommandError>;
        fn put(&self, path: &str, contents: &str) -> Result<(), CommandError>;
        fn put_binary(&self, path: &str, contents: &[u8]) -> Result<(), CommandError>;
        fn mkdir(&self, path: &str) -> Result<(), CommandError>;
        fn remove(&self, path: &str) -> Result<(), CommandError>;
        fn exists(&self, path: &str) -> Result<bool, CommandError>;
        fn execute_process(&self, request: &ProcessRequest) -> Result<ProcessResult, CommandError>;
        fn wait_for_process(
            &self,
            handle: Handle,
            timeout: Duration,
        ) -> Result<ProcessResult, CommandError>;
    }
}

mock! {
    pub Reporter {}
    impl HealthReporter for Reporter {
        fn bootstrap_starting(&self);
        fn bootstrap_succeeded(&self, config: &Config, templates: usize);
        fn bootstrap_failed(&self, error: &BootstrapError);
        fn listener_started(&self, address: SocketAddr);
        fn listener_stopped(&self);
    }
}

pub(crate) const ECHO_TEMPLATES: &str = r#"
[[process]]
name = "echo"
command = { default = "echo" }

[[process.parameter]]
value = "${MSG}"
if_defined = "MSG"

[[process]]
name = "sleep"
command = { default = "sleep ${SECONDS}" }
"#;

/// Temporary daemon layout: a config file, a template file and a root.
pub(crate) struct DaemonLayout {
    _dir: TempDir,
    base: Utf8PathBuf,
}

impl DaemonLayout {
    pub(crate) fn new(templates: &str, extra_config: &str) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let base = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 path");
        fs::create_dir(base.join("root")).expect("root dir");
        fs::write(base.join("procdef.toml"), templates).expect("templates");
        let config = format!(
            "port = 0\nhost = \"127.0.0.1\"\npathRoot = \"root\"\npoll_interval_ms = 20\n{extra_config}\n"
        );
        fs::write(base.join("procd.toml"), config).expect("config");
        Self { _dir: dir, base }
    }

    pub(crate) fn config_path(&self) -> Utf8PathBuf {
        self.base.join("procd.toml")
    }

    pub(crate) fn root(&self) -> Utf8PathBuf {
        self.base.join("root")
    }

    pub(crate) fn base(&self) -> &Utf8Path {
        &self.base
    }

    pub(crate) fn config(&self) -> Config {
        Config::load(&self.config_path(), &ConfigOverrides::default()).expect("config loads")
    }
}
