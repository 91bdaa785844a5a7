//! Daemon entrypoint.

use std::io::{self, Write};
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use procd_config::{ConfigOverrides, DEFAULT_CONFIG_PATH};

/// Process-execution daemon serving framed requests over TCP.
#[derive(Parser, Debug)]
#[command(name = "procd", version)]
struct Cli {
    /// Configuration file.
    #[arg(value_name = "CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: Utf8PathBuf,
    #[command(flatten)]
    overrides: ConfigOverrides,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match procd::run_daemon(&cli.config, cli.overrides) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let mut stderr = io::stderr().lock();
            match writeln!(stderr, "procd: {error}") {
                Ok(()) | Err(_) => ExitCode::FAILURE,
            }
        }
    }
}
