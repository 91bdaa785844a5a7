//! Precedence of the file, `PROCD_*` variables and command-line flags.

use std::ffi::OsString;
use std::fs;
use std::sync::{Mutex, MutexGuard};

use camino::Utf8PathBuf;
use once_cell::sync::Lazy;
use procd_config::{Config, ConfigError, ConfigOverrides, LogFormat};
use rstest::{fixture, rstest};
use tempfile::TempDir;

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Serialises environment access and restores touched variables on drop.
struct Environment {
    previous: Vec<(&'static str, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl Environment {
    fn lock() -> Self {
        let guard = ENV_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut environment = Self {
            previous: Vec::new(),
            _guard: guard,
        };
        for key in ["PROCD_PORT", "PROCD_LOG_FILTER", "PROCD_LOG_FORMAT", "PROCD_HOST"] {
            environment.remove(key);
        }
        environment
    }

    fn set(&mut self, key: &'static str, value: &str) {
        self.previous.push((key, std::env::var_os(key)));
        // Environment mutation is unsafe under edition 2024; access is
        // serialised through ENV_MUTEX and undone in Drop.
        unsafe { std::env::set_var(key, value) };
    }

    fn remove(&mut self, key: &'static str) {
        self.previous.push((key, std::env::var_os(key)));
        unsafe { std::env::remove_var(key) };
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        while let Some((key, value)) = self.previous.pop() {
            match value {
                Some(value) => unsafe { std::env::set_var(key, value) },
                None => unsafe { std::env::remove_var(key) },
            }
        }
    }
}

struct ConfigFile {
    _dir: TempDir,
    path: Utf8PathBuf,
}

#[fixture]
fn config_file() -> ConfigFile {
    let dir = TempDir::new().expect("temp dir");
    let base = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 path");
    fs::create_dir(base.join("root")).expect("root dir");
    let path = base.join("procd.toml");
    fs::write(
        &path,
        "port = 7000\npathRoot = \"root\"\nlog_filter = \"procd=debug\"\nlog_format = \"json\"\n",
    )
    .expect("write config");
    ConfigFile { _dir: dir, path }
}

#[rstest]
fn file_values_apply_without_overrides(config_file: ConfigFile) {
    let _environment = Environment::lock();
    let config = Config::load(&config_file.path, &ConfigOverrides::default()).expect("load");
    assert_eq!(config.port(), 7000);
    assert_eq!(config.log_filter(), "procd=debug");
    assert_eq!(config.log_format(), LogFormat::Json);
}

#[rstest]
fn environment_overrides_the_file(config_file: ConfigFile) {
    let mut environment = Environment::lock();
    environment.set("PROCD_PORT", "7100");
    environment.set("PROCD_LOG_FORMAT", "compact");
    environment.set("PROCD_HOST", "127.0.0.1");

    let config = Config::load(&config_file.path, &ConfigOverrides::default()).expect("load");
    assert_eq!(config.port(), 7100);
    assert_eq!(config.log_format(), LogFormat::Compact);
    assert_eq!(config.host(), "127.0.0.1");
    assert_eq!(config.log_filter(), "procd=debug");
}

#[rstest]
fn flags_override_the_environment(config_file: ConfigFile) {
    let mut environment = Environment::lock();
    environment.set("PROCD_PORT", "7100");
    environment.set("PROCD_LOG_FILTER", "warn");

    let overrides = ConfigOverrides {
        port: Some(7200),
        ..ConfigOverrides::default()
    };
    let config = Config::load(&config_file.path, &overrides).expect("load");
    assert_eq!(config.port(), 7200);
    assert_eq!(config.log_filter(), "warn");
}

#[rstest]
fn malformed_environment_values_fail(config_file: ConfigFile) {
    let mut environment = Environment::lock();
    environment.set("PROCD_PORT", "not-a-port");

    let error = Config::load(&config_file.path, &ConfigOverrides::default())
        .expect_err("invalid port");
    assert!(matches!(error, ConfigError::Layering { .. }));
}
