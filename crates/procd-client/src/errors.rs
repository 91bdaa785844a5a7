//! Error types for the remote stub and the CLI runtime.

use std::io;

use camino::Utf8PathBuf;
use procd_protocol::{CommandError, DocumentError, FrameError};
use thiserror::Error;

/// Failures talking to the daemon, before or after the command ran.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The daemon host could not be resolved.
    #[error("failed to resolve daemon address {endpoint}: {source}")]
    Resolve {
        /// `host:port` being resolved.
        endpoint: String,
        /// Resolver failure.
        #[source]
        source: io::Error,
    },
    /// No connection could be established.
    #[error("failed to connect to daemon at {endpoint}: {source}")]
    Connect {
        /// `host:port` being contacted.
        endpoint: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Socket options could not be applied.
    #[error("failed to configure connection to {endpoint}: {source}")]
    Configure {
        /// `host:port` being contacted.
        endpoint: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The request frame could not be sent.
    #[error("failed to send request to daemon: {0}")]
    SendRequest(#[source] FrameError),
    /// The response frame could not be read.
    #[error("failed to read response from daemon: {0}")]
    ReadResponse(#[source] FrameError),
    /// The daemon answered with an unreadable result document.
    #[error("daemon returned an invalid result document: {0}")]
    ParseResult(#[source] DocumentError),
}

impl From<ClientError> for CommandError {
    fn from(error: ClientError) -> Self {
        Self::transport(error.to_string())
    }
}

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("failed to render process result: {0}")]
    RenderResult(DocumentError),
    #[error("failed to read local file '{path}': {source}")]
    ReadInput {
        path: Utf8PathBuf,
        source: io::Error,
    },
    #[error("invalid parameter definition '{0}': expected NAME=VALUE")]
    Definition(String),
    #[error("failed to write output: {0}")]
    WriteOutput(io::Error),
}
