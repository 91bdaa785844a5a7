//! Remote implementation of the command contract.

use std::io::{BufReader, BufWriter, Write};
use std::time::Duration;

use procd_protocol::{
    CommandError, CommandHandler, FrameLimits, Handle, ProcessRequest, ProcessResult,
    RequestFrame, ResponseFrame, WireCommand,
};

use crate::errors::ClientError;
use crate::transport::{CONNECTION_TIMEOUT, connect};

/// Sends each command to a daemon over a fresh TCP connection.
///
/// Daemon failures come back with the error kind the daemon reported;
/// connection and framing problems surface as
/// [`procd_protocol::ErrorKind::Transport`].
#[derive(Debug, Clone)]
pub struct RemoteCommandHandler {
    host: String,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Option<Duration>,
    limits: FrameLimits,
}

impl RemoteCommandHandler {
    /// Targets the daemon listening on `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: CONNECTION_TIMEOUT,
            read_timeout: None,
            limits: FrameLimits::default(),
        }
    }

    /// Budget for establishing each connection.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Upper bound on waiting for a response; unbounded by default.
    ///
    /// Process commands block for their wait budget, so this should exceed
    /// the longest wait a caller requests.
    #[must_use]
    pub const fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Daemon host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Daemon port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Performs one request/response exchange.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] when the daemon cannot be reached or the
    /// frames cannot be exchanged.
    pub fn exchange(&self, request: &RequestFrame) -> Result<ResponseFrame, ClientError> {
        let stream = connect(&self.host, self.port, self.connect_timeout)?;
        stream
            .set_read_timeout(self.read_timeout)
            .map_err(|source| ClientError::Configure {
                endpoint: format!("{}:{}", self.host, self.port),
                source,
            })?;

        let mut writer = BufWriter::new(&stream);
        request
            .write_to(&mut writer)
            .and_then(|()| writer.flush().map_err(Into::into))
            .map_err(ClientError::SendRequest)?;

        let mut reader = BufReader::new(&stream);
        ResponseFrame::read_from(&mut reader, self.limits).map_err(ClientError::ReadResponse)
    }

    fn call(&self, request: &RequestFrame) -> Result<String, CommandError> {
        self.exchange(request)?.into_result()
    }

    fn process_call(&self, request: &RequestFrame) -> Result<ProcessResult, CommandError> {
        let document = self.call(request)?;
        ProcessResult::from_document(document.as_bytes())
            .map_err(|error| ClientError::ParseResult(error).into())
    }
}

fn frame(command: WireCommand) -> RequestFrame {
    RequestFrame::new(command.to_string())
}

impl CommandHandler for RemoteCommandHandler {
    fn get(&self, path: &str) -> Result<String, CommandError> {
        self.call(&frame(WireCommand::Get).with_parameter(path))
    }

    fn put(&self, path: &str, contents: &str) -> Result<(), CommandError> {
        self.call(
            &frame(WireCommand::Put)
                .with_parameter(path)
                .with_parameter(contents),
        )
        .map(drop)
    }

    fn put_binary(&self, path: &str, contents: &[u8]) -> Result<(), CommandError> {
        self.call(
            &frame(WireCommand::PutBinary)
                .with_parameter(path)
                .with_parameter(contents),
        )
        .map(drop)
    }

    fn mkdir(&self, path: &str) -> Result<(), CommandError> {
        self.call(&frame(WireCommand::Mkdir).with_parameter(path))
            .map(drop)
    }

    fn remove(&self, path: &str) -> Result<(), CommandError> {
        self.call(&frame(WireCommand::Rm).with_parameter(path))
            .map(drop)
    }

    fn exists(&self, path: &str) -> Result<bool, CommandError> {
        let answer = self.call(&frame(WireCommand::Exists).with_parameter(path))?;
        match answer.trim() {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(CommandError::transport(format!(
                "unexpected exists answer '{other}'"
            ))),
        }
    }

    fn execute_process(&self, request: &ProcessRequest) -> Result<ProcessResult, CommandError> {
        let document = request
            .to_document()
            .map_err(|error| CommandError::malformed(error.to_string()))?;
        self.process_call(&frame(WireCommand::ExecProcess).with_parameter(document))
    }

    fn wait_for_process(
        &self,
        handle: Handle,
        timeout: Duration,
    ) -> Result<ProcessResult, CommandError> {
        let millis = timeout.as_millis().to_string();
        self.process_call(
            &frame(WireCommand::WaitForProcess)
                .with_parameter(handle.to_string())
                .with_parameter(millis),
        )
    }
}
