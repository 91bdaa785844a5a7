//! In-process implementation of the command contract.

use std::fs;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use procd_protocol::{CommandError, CommandHandler, Handle, ProcessRequest, ProcessResult};
use tracing::debug;

use crate::dispatcher::Dispatcher;

const LOCAL_TARGET: &str = "procd_exec::local";

/// Maps virtual paths onto a directory.
///
/// Leading `/` and `\` separators are ignored. Any path that could climb out
/// of the root is rejected before the filesystem is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualRoot {
    root: Utf8PathBuf,
}

impl VirtualRoot {
    /// Uses `root` as the base of every virtual path.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Base directory.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Resolves a virtual path below the root.
    ///
    /// # Errors
    ///
    /// Returns an [`procd_protocol::ErrorKind::InvalidPath`] error for paths
    /// containing parent references or absolute prefixes.
    pub fn resolve(&self, path: &str) -> Result<Utf8PathBuf, CommandError> {
        let relative = path.trim_start_matches(['/', '\\']);
        if escapes_root(relative) {
            return Err(CommandError::invalid_path(path));
        }
        Ok(self.root.join(relative))
    }
}

fn escapes_root(relative: &str) -> bool {
    if relative == ".."
        || relative.contains("../")
        || relative.contains("..\\")
        || relative.ends_with("/..")
        || relative.ends_with("\\..")
    {
        return true;
    }
    Utf8Path::new(relative).components().any(|component| {
        !matches!(component, Utf8Component::Normal(_) | Utf8Component::CurDir)
    })
}

/// Serves commands against a local root and dispatcher.
#[derive(Debug, Clone)]
pub struct LocalCommandHandler {
    root: VirtualRoot,
    dispatcher: Arc<Dispatcher>,
}

impl LocalCommandHandler {
    /// Creates a handler.
    #[must_use]
    pub const fn new(root: VirtualRoot, dispatcher: Arc<Dispatcher>) -> Self {
        Self { root, dispatcher }
    }

    /// Virtual filesystem root.
    #[must_use]
    pub const fn root(&self) -> &VirtualRoot {
        &self.root
    }

    /// Dispatcher running process requests.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

fn io_failure(action: &str, path: &str, error: &io::Error) -> CommandError {
    CommandError::command(format!("failed to {action} '{path}': {error}"))
}

fn ensure_parent(target: &Utf8Path, path: &str) -> Result<(), CommandError> {
    match target.parent() {
        Some(parent) if !parent.as_str().is_empty() => fs::create_dir_all(parent)
            .map_err(|error| io_failure("create parent directories of", path, &error)),
        _ => Ok(()),
    }
}

impl CommandHandler for LocalCommandHandler {
    fn get(&self, path: &str) -> Result<String, CommandError> {
        let target = self.root.resolve(path)?;
        debug!(target: LOCAL_TARGET, path, "reading file");
        fs::read_to_string(&target).map_err(|error| io_failure("read", path, &error))
    }

    fn put(&self, path: &str, contents: &str) -> Result<(), CommandError> {
        self.put_binary(path, contents.as_bytes())
    }

    fn put_binary(&self, path: &str, contents: &[u8]) -> Result<(), CommandError> {
        let target = self.root.resolve(path)?;
        ensure_parent(&target, path)?;
        debug!(
            target: LOCAL_TARGET,
            path,
            bytes = contents.len(),
            "writing file"
        );
        fs::write(&target, contents).map_err(|error| io_failure("write", path, &error))
    }

    fn mkdir(&self, path: &str) -> Result<(), CommandError> {
        let target = self.root.resolve(path)?;
        debug!(target: LOCAL_TARGET, path, "creating directory");
        fs::create_dir_all(&target).map_err(|error| io_failure("create directory", path, &error))
    }

    fn remove(&self, path: &str) -> Result<(), CommandError> {
        let target = self.root.resolve(path)?;
        if target.as_path() == self.root.root() {
            return Err(CommandError::command("refusing to remove the daemon root"));
        }
        let metadata = match fs::symlink_metadata(&target) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(error) => return Err(io_failure("inspect", path, &error)),
        };
        debug!(target: LOCAL_TARGET, path, "removing path");
        let removed = if metadata.is_dir() {
            fs::remove_dir_all(&target)
        } else {
            fs::remove_file(&target)
        };
        removed.map_err(|error| io_failure("remove", path, &error))
    }

    fn exists(&self, path: &str) -> Result<bool, CommandError> {
        let target = self.root.resolve(path)?;
        target
            .as_std_path()
            .try_exists()
            .map_err(|error| io_failure("inspect", path, &error))
    }

    fn execute_process(&self, request: &ProcessRequest) -> Result<ProcessResult, CommandError> {
        Ok(self.dispatcher.dispatch(request))
    }

    fn wait_for_process(
        &self,
        handle: Handle,
        timeout: Duration,
    ) -> Result<ProcessResult, CommandError> {
        Ok(self.dispatcher.wait_for_handle(handle, timeout))
    }
}
