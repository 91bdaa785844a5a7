//! Command contract shared by local and remote handlers.

use std::time::Duration;

use crate::{CommandError, Handle, ProcessRequest, ProcessResult};

/// Operations the daemon serves.
///
/// Paths are virtual: they are interpreted relative to the root of whichever
/// host ends up running the command.
pub trait CommandHandler: Send + Sync {
    /// Reads a text file.
    ///
    /// # Errors
    ///
    /// Fails for paths outside the root or when the file cannot be read.
    fn get(&self, path: &str) -> Result<String, CommandError>;

    /// Writes a text file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Fails for paths outside the root or when the write fails.
    fn put(&self, path: &str, contents: &str) -> Result<(), CommandError>;

    /// Writes a binary file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Fails for paths outside the root or when the write fails.
    fn put_binary(&self, path: &str, contents: &[u8]) -> Result<(), CommandError>;

    /// Creates a directory and any missing parents.
    ///
    /// # Errors
    ///
    /// Fails for paths outside the root or when creation fails.
    fn mkdir(&self, path: &str) -> Result<(), CommandError>;

    /// Removes a file or directory tree; missing paths succeed.
    ///
    /// # Errors
    ///
    /// Fails for paths outside the root or when removal fails.
    fn remove(&self, path: &str) -> Result<(), CommandError>;

    /// Reports whether a path exists.
    ///
    /// # Errors
    ///
    /// Fails for paths outside the root.
    fn exists(&self, path: &str) -> Result<bool, CommandError>;

    /// Runs a process template.
    ///
    /// Process outcomes, including spawn failures, are reported through the
    /// returned [`ProcessResult`].
    ///
    /// # Errors
    ///
    /// Fails only when the request cannot reach an executor.
    fn execute_process(&self, request: &ProcessRequest) -> Result<ProcessResult, CommandError>;

    /// Waits for a detached process and reports its outcome.
    ///
    /// # Errors
    ///
    /// Fails only when the request cannot reach an executor.
    fn wait_for_process(
        &self,
        handle: Handle,
        timeout: Duration,
    ) -> Result<ProcessResult, CommandError>;
}
