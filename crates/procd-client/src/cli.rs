//! Command-line interface definitions for `procctl`.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use procd_protocol::Handle;

/// Client for the procd process-execution daemon.
#[derive(Parser, Debug)]
#[command(name = "procctl", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// Daemon host name or address.
    #[arg(long, default_value = "127.0.0.1")]
    pub(crate) host: String,
    /// Daemon port.
    #[arg(long, short)]
    pub(crate) port: u16,
    /// Connection timeout in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    pub(crate) connect_timeout_ms: u64,
    /// Operation to perform.
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Operations mirroring the daemon's wire commands.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum CliCommand {
    /// Prints a text file.
    Get {
        /// Virtual path below the daemon root.
        path: String,
    },
    /// Writes a text file.
    Put {
        /// Virtual path below the daemon root.
        path: String,
        /// File contents.
        text: String,
    },
    /// Uploads a local file as raw bytes.
    PutBinary {
        /// Virtual path below the daemon root.
        path: String,
        /// Local file to upload.
        file: Utf8PathBuf,
    },
    /// Creates a directory and its parents.
    Mkdir {
        /// Virtual path below the daemon root.
        path: String,
    },
    /// Removes a file or directory tree.
    Rm {
        /// Virtual path below the daemon root.
        path: String,
    },
    /// Prints `1` when the path exists and `0` otherwise.
    Exists {
        /// Virtual path below the daemon root.
        path: String,
    },
    /// Runs a process template and prints the result document.
    Exec {
        /// Template name.
        name: String,
        /// Milliseconds to wait before detaching or terminating.
        #[arg(long, default_value_t = 1_000, allow_negative_numbers = true)]
        wait_millis: i64,
        /// Kill the process when the wait budget runs out.
        #[arg(long)]
        terminate: bool,
        /// Context variable override, as `NAME=VALUE`; repeatable.
        #[arg(short = 'D', long = "define", value_name = "NAME=VALUE")]
        definitions: Vec<String>,
    },
    /// Waits for a detached process and prints the result document.
    Wait {
        /// Handle returned by a `started` result.
        handle: Handle,
        /// Milliseconds to wait before the process is terminated.
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,
    },
}
