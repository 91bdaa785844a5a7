//! Process request and result documents.
//!
//! Both documents are immutable value objects serialised as JSON inside the
//! byte parameters of `execprocess` and the payload of its response.

use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

/// Result code reported for framework-level failures and terminations.
pub const FRAMEWORK_RESULT_CODE: i32 = -1;

/// Errors raised while encoding or decoding documents.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The JSON payload could not be parsed or produced.
    #[error("invalid process document: {0}")]
    Json(#[from] serde_json::Error),
    /// A non-`started` result carried a handle.
    #[error("a '{status}' result cannot carry a process handle")]
    UnexpectedHandle {
        /// Declared status.
        status: ResultStatus,
    },
    /// A `started` result had no handle.
    #[error("a 'started' result must carry a process handle")]
    MissingHandle,
}

/// Opaque key of a detached process.
///
/// Handles are positive and never reused within one daemon's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(NonZeroU64);

impl Handle {
    /// Wraps a raw value; zero is not a valid handle.
    #[must_use]
    pub const fn new(value: u64) -> Option<Self> {
        match NonZeroU64::new(value) {
            Some(value) => Some(Self(value)),
            None => None,
        }
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl From<NonZeroU64> for Handle {
    fn from(value: NonZeroU64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl FromStr for Handle {
    type Err = std::num::ParseIntError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        input.trim().parse::<NonZeroU64>().map(Self)
    }
}

/// Outcome category of a process request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResultStatus {
    /// The process exited within the wait budget.
    Finished,
    /// The request could not be carried out.
    Error,
    /// The process was forcibly killed.
    Terminated,
    /// The process is still running under a handle.
    Started,
}

/// Request to run a named process template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRequest {
    name: String,
    #[serde(default)]
    wait_millis: i64,
    #[serde(default)]
    terminate: bool,
    #[serde(default)]
    parameters: BTreeMap<String, String>,
}

impl ProcessRequest {
    /// Creates a request for `name` with no wait budget and no overrides.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            wait_millis: 0,
            terminate: false,
            parameters: BTreeMap::new(),
        }
    }

    /// Sets the wait budget in milliseconds.
    #[must_use]
    pub const fn with_wait_millis(mut self, wait_millis: i64) -> Self {
        self.wait_millis = wait_millis;
        self
    }

    /// Requests forced termination when the budget runs out.
    #[must_use]
    pub const fn with_terminate(mut self, terminate: bool) -> Self {
        self.terminate = terminate;
        self
    }

    /// Adds a context override.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Template name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait budget as sent by the caller.
    #[must_use]
    pub const fn wait_millis(&self) -> i64 {
        self.wait_millis
    }

    /// Effective wait budget; non-positive values become one millisecond.
    #[must_use]
    pub fn wait_budget(&self) -> Duration {
        Duration::from_millis(u64::try_from(self.wait_millis).unwrap_or(0).max(1))
    }

    /// Whether an expired budget kills the process.
    #[must_use]
    pub const fn terminate(&self) -> bool {
        self.terminate
    }

    /// Context overrides supplied with the request.
    #[must_use]
    pub const fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    /// Serialises the request document.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Json`] when serialisation fails.
    pub fn to_document(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a request document.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Json`] when the payload is not a request.
    pub fn from_document(bytes: &[u8]) -> Result<Self, DocumentError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Outcome of a process request or of a handle poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ResultDocument", into = "ResultDocument")]
pub struct ProcessResult {
    name: String,
    status: ResultStatus,
    result_code: i32,
    result_text: String,
    handle: Option<Handle>,
}

impl ProcessResult {
    /// The process exited with `exit_code`.
    pub fn finished(name: impl Into<String>, exit_code: i32, output: &str) -> Self {
        Self::build(name, ResultStatus::Finished, exit_code, output, None)
    }

    /// The process was killed after its budget expired.
    pub fn terminated(name: impl Into<String>, output: &str) -> Self {
        Self::build(
            name,
            ResultStatus::Terminated,
            FRAMEWORK_RESULT_CODE,
            output,
            None,
        )
    }

    /// The request failed before or while running the process.
    pub fn error(name: impl Into<String>, message: &str) -> Self {
        Self::build(
            name,
            ResultStatus::Error,
            FRAMEWORK_RESULT_CODE,
            message,
            None,
        )
    }

    /// The process is still running and can be polled through `handle`.
    pub fn started(name: impl Into<String>, handle: Handle, output: &str) -> Self {
        Self::build(name, ResultStatus::Started, 0, output, Some(handle))
    }

    fn build(
        name: impl Into<String>,
        status: ResultStatus,
        result_code: i32,
        text: &str,
        handle: Option<Handle>,
    ) -> Self {
        Self {
            name: name.into(),
            status,
            result_code,
            result_text: strip_control_characters(text),
            handle,
        }
    }

    /// Template name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Outcome category.
    #[must_use]
    pub const fn status(&self) -> ResultStatus {
        self.status
    }

    /// Exit code for finished processes, `-1` for framework outcomes.
    #[must_use]
    pub const fn result_code(&self) -> i32 {
        self.result_code
    }

    /// Console output or error message.
    #[must_use]
    pub fn result_text(&self) -> &str {
        &self.result_text
    }

    /// Handle of a detached process; `None` unless the status is `started`.
    #[must_use]
    pub const fn handle(&self) -> Option<Handle> {
        self.handle
    }

    /// Serialises the result document.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Json`] when serialisation fails.
    pub fn to_document(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a result document, enforcing the handle invariant.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Json`] for malformed payloads, including a
    /// handle that does not match the declared status.
    pub fn from_document(bytes: &[u8]) -> Result<Self, DocumentError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Wire shape of [`ProcessResult`]; the handle is `-1` when absent.
#[derive(Serialize, Deserialize)]
struct ResultDocument {
    name: String,
    status: ResultStatus,
    result_code: i32,
    #[serde(default)]
    result_text: String,
    #[serde(default = "absent_handle")]
    handle: i64,
}

const fn absent_handle() -> i64 {
    -1
}

impl From<ProcessResult> for ResultDocument {
    fn from(result: ProcessResult) -> Self {
        let handle = result
            .handle
            .and_then(|handle| i64::try_from(handle.get()).ok())
            .unwrap_or_else(absent_handle);
        Self {
            name: result.name,
            status: result.status,
            result_code: result.result_code,
            result_text: result.result_text,
            handle,
        }
    }
}

impl TryFrom<ResultDocument> for ProcessResult {
    type Error = DocumentError;

    fn try_from(document: ResultDocument) -> Result<Self, Self::Error> {
        let handle = u64::try_from(document.handle).ok().and_then(Handle::new);
        match (document.status, handle) {
            (ResultStatus::Started, None) => return Err(DocumentError::MissingHandle),
            (status, Some(_)) if status != ResultStatus::Started => {
                return Err(DocumentError::UnexpectedHandle { status });
            }
            _ => {}
        }
        Ok(Self::build(
            document.name,
            document.status,
            document.result_code,
            &document.result_text,
            handle,
        ))
    }
}

/// Removes control characters other than whitespace.
#[must_use]
pub fn strip_control_characters(text: &str) -> String {
    text.chars()
        .filter(|character| !character.is_control() || character.is_whitespace())
        .collect()
}
