//! Remote stub and command-line client for the procd daemon.
//!
//! [`RemoteCommandHandler`] implements [`procd_protocol::CommandHandler`] by
//! sending one request frame per call to a running daemon, so code written
//! against the handler contract runs unchanged against a local handler or a
//! remote host. The `procctl` binary wraps the stub for shell use.

mod cli;
mod errors;
mod remote;
mod transport;

use std::ffi::OsString;
use std::fmt::Display;
use std::fs;
use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use procd_protocol::{CommandHandler, ProcessRequest, ProcessResult};

use crate::cli::{Cli, CliCommand};
use crate::errors::AppError;

pub use crate::errors::ClientError;
pub use crate::remote::RemoteCommandHandler;
pub use crate::transport::CONNECTION_TIMEOUT;

/// Runs `procctl` with the given arguments and output streams.
///
/// Result text goes to `stdout`; diagnostics go to `stderr`. The exit code is
/// success only when the daemon reported success.
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) if error.use_stderr() => return fail(stderr, &error.render()),
        Err(error) => {
            return match write!(stdout, "{}", error.render()) {
                Ok(()) => ExitCode::SUCCESS,
                Err(write_error) => fail(stderr, &write_error),
            };
        }
    };

    let remote = RemoteCommandHandler::new(cli.host, cli.port)
        .with_connect_timeout(Duration::from_millis(cli.connect_timeout_ms));
    match execute(&remote, cli.command, stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => fail(stderr, &format_args!("procctl: {error}")),
    }
}

fn fail<E: Write>(stderr: &mut E, message: &dyn Display) -> ExitCode {
    match writeln!(stderr, "{}", message.to_string().trim_end()) {
        Ok(()) | Err(_) => ExitCode::FAILURE,
    }
}

fn execute<W: Write>(
    handler: &dyn CommandHandler,
    command: CliCommand,
    stdout: &mut W,
) -> Result<(), AppError> {
    let output = match command {
        CliCommand::Get { path } => handler.get(&path)?,
        CliCommand::Put { path, text } => {
            handler.put(&path, &text)?;
            String::new()
        }
        CliCommand::PutBinary { path, file } => {
            let bytes = fs::read(&file).map_err(|source| AppError::ReadInput {
                path: file.clone(),
                source,
            })?;
            handler.put_binary(&path, &bytes)?;
            String::new()
        }
        CliCommand::Mkdir { path } => {
            handler.mkdir(&path)?;
            String::new()
        }
        CliCommand::Rm { path } => {
            handler.remove(&path)?;
            String::new()
        }
        CliCommand::Exists { path } => {
            String::from(if handler.exists(&path)? { "1" } else { "0" })
        }
        CliCommand::Exec {
            name,
            wait_millis,
            terminate,
            definitions,
        } => {
            let request = build_request(name, wait_millis, terminate, &definitions)?;
            render(&handler.execute_process(&request)?)?
        }
        CliCommand::Wait { handle, timeout_ms } => {
            render(&handler.wait_for_process(handle, Duration::from_millis(timeout_ms))?)?
        }
    };
    write_output(stdout, &output).map_err(AppError::WriteOutput)
}

fn build_request(
    name: String,
    wait_millis: i64,
    terminate: bool,
    definitions: &[String],
) -> Result<ProcessRequest, AppError> {
    definitions.iter().try_fold(
        ProcessRequest::new(name)
            .with_wait_millis(wait_millis)
            .with_terminate(terminate),
        |request, definition| match definition.split_once('=') {
            Some((variable, value)) if !variable.trim().is_empty() => {
                Ok(request.with_parameter(variable.trim(), value))
            }
            _ => Err(AppError::Definition(definition.clone())),
        },
    )
}

fn render(result: &ProcessResult) -> Result<String, AppError> {
    result.to_document().map_err(AppError::RenderResult)
}

fn write_output<W: Write>(stdout: &mut W, output: &str) -> std::io::Result<()> {
    if output.is_empty() {
        return Ok(());
    }
    stdout.write_all(output.as_bytes())?;
    if !output.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()
}

#[cfg(test)]
mod tests;
