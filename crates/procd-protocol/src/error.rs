//! Error surface shared by every command handler.
//!
//! Failures crossing the [`crate::CommandHandler`] boundary collapse into a
//! single [`CommandError`] carrying an [`ErrorKind`]. The kind decides the
//! wire result code, so the daemon can turn any handler failure into a
//! response frame and the remote stub can rebuild the same error from one.
//! Child process exit codes are never errors; they travel as data inside a
//! [`crate::ProcessResult`].

use std::fmt;

use thiserror::Error;

/// Category of a handler failure, mapped one-to-one onto wire result codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The command name in the request frame is not recognised.
    UnknownCommand,
    /// The connecting address is not in the configured allow-list.
    RejectedAddress,
    /// The request frame or one of its parameters could not be decoded.
    MalformedRequest,
    /// A virtual path escapes the configured root.
    InvalidPath,
    /// The command ran and failed (I/O failure, unknown handle, ...).
    Command,
    /// The client could not reach the daemon or read its reply.
    ///
    /// Produced only on the client side; the daemon never writes this code.
    Transport,
}

impl ErrorKind {
    /// Wire code for a successful exchange.
    pub const SUCCESS_CODE: i32 = 0;

    /// Returns the result code written to the response frame.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::UnknownCommand => -1,
            Self::RejectedAddress => -2,
            Self::MalformedRequest => -3,
            Self::InvalidPath => -4,
            Self::Transport => -5,
            Self::Command => 1,
        }
    }

    /// Maps a non-zero response code back to a kind.
    ///
    /// Unknown negative codes are treated as malformed requests and every
    /// positive code is a command failure.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            -1 => Self::UnknownCommand,
            -2 => Self::RejectedAddress,
            -4 => Self::InvalidPath,
            -5 => Self::Transport,
            code if code > 0 => Self::Command,
            _ => Self::MalformedRequest,
        }
    }

    /// Returns `true` for failures raised by the daemon framework itself
    /// rather than by the invoked command.
    #[must_use]
    pub const fn is_framework(self) -> bool {
        !matches!(self, Self::Command)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::UnknownCommand => "unknown command",
            Self::RejectedAddress => "rejected address",
            Self::MalformedRequest => "malformed request",
            Self::InvalidPath => "invalid path",
            Self::Command => "command failed",
            Self::Transport => "transport failure",
        };
        formatter.write_str(label)
    }
}

/// Failure reported by a command handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct CommandError {
    kind: ErrorKind,
    message: String,
}

impl CommandError {
    /// Builds an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Rebuilds an error from a non-zero response code and its payload.
    pub fn from_response(code: i32, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::from_code(code), message)
    }

    /// Unknown command name.
    pub fn unknown_command(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownCommand, name)
    }

    /// Connecting address outside the allow-list.
    pub fn rejected_address(address: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::RejectedAddress,
            format!("remote address {address} is not allowed"),
        )
    }

    /// Undecodable request.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedRequest, message)
    }

    /// Virtual path rejected before touching the filesystem.
    pub fn invalid_path(path: &str) -> Self {
        Self::new(
            ErrorKind::InvalidPath,
            format!("path '{path}' escapes the daemon root"),
        )
    }

    /// Command level failure.
    pub fn command(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Command, message)
    }

    /// Client-side connection or framing failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    /// Returns the error category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the wire result code for this error.
    #[must_use]
    pub const fn code(&self) -> i32 {
        self.kind.code()
    }

    /// Returns the human-readable message without the kind prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::unknown(ErrorKind::UnknownCommand, -1)]
    #[case::rejected(ErrorKind::RejectedAddress, -2)]
    #[case::malformed(ErrorKind::MalformedRequest, -3)]
    #[case::path(ErrorKind::InvalidPath, -4)]
    #[case::transport(ErrorKind::Transport, -5)]
    #[case::command(ErrorKind::Command, 1)]
    fn codes_map_back_to_kinds(#[case] kind: ErrorKind, #[case] code: i32) {
        assert_eq!(kind.code(), code);
        assert_eq!(ErrorKind::from_code(code), kind);
    }

    #[test]
    fn any_positive_code_is_a_command_failure() {
        assert_eq!(ErrorKind::from_code(17), ErrorKind::Command);
        assert!(!ErrorKind::Command.is_framework());
    }

    #[test]
    fn unexpected_negative_codes_are_framework_failures() {
        let kind = ErrorKind::from_code(-42);
        assert_eq!(kind, ErrorKind::MalformedRequest);
        assert!(kind.is_framework());
    }

    #[test]
    fn display_includes_kind_and_message() {
        let error = CommandError::invalid_path("../etc/passwd");
        assert_eq!(
            error.to_string(),
            "invalid path: path '../etc/passwd' escapes the daemon root"
        );
        assert_eq!(error.code(), -4);
    }
}
