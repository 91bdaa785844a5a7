//! Maps decoded request frames onto handler calls.

use std::str;
use std::time::Duration;

use procd_protocol::{
    CommandError, CommandHandler, Handle, ProcessRequest, ProcessResult, RequestFrame,
    WireCommand,
};
use tracing::debug;

use super::DISPATCH_TARGET;

/// Routes one request and returns the success payload.
pub(crate) fn route(
    handler: &dyn CommandHandler,
    request: &RequestFrame,
) -> Result<String, CommandError> {
    let name = request.command().trim();
    let command = WireCommand::parse(name).map_err(|_| CommandError::unknown_command(name))?;
    let parameters = Parameters::new(command, request.parameters())?;
    debug!(
        target: DISPATCH_TARGET,
        %command,
        parameters = parameters.len(),
        "routing request"
    );

    match command {
        WireCommand::Get => handler.get(parameters.text(0)?),
        WireCommand::Put => handler
            .put(parameters.text(0)?, parameters.text(1)?)
            .map(|()| String::new()),
        WireCommand::PutBinary => handler
            .put_binary(parameters.text(0)?, parameters.bytes(1))
            .map(|()| String::new()),
        WireCommand::Mkdir => handler.mkdir(parameters.text(0)?).map(|()| String::new()),
        WireCommand::Rm => handler.remove(parameters.text(0)?).map(|()| String::new()),
        WireCommand::Exists => handler
            .exists(parameters.text(0)?)
            .map(|exists| String::from(if exists { "1" } else { "0" })),
        WireCommand::ExecProcess => {
            let request = ProcessRequest::from_document(parameters.bytes(0))
                .map_err(|error| CommandError::malformed(error.to_string()))?;
            result_document(&handler.execute_process(&request)?)
        }
        WireCommand::WaitForProcess => {
            let handle = parameters.handle(0)?;
            let timeout = parameters.millis(1)?;
            result_document(&handler.wait_for_process(handle, timeout)?)
        }
    }
}

fn result_document(result: &ProcessResult) -> Result<String, CommandError> {
    result
        .to_document()
        .map_err(|error| CommandError::command(error.to_string()))
}

/// Parameters of a request whose count matches the command's arity.
struct Parameters<'a> {
    command: WireCommand,
    values: &'a [Vec<u8>],
}

impl<'a> Parameters<'a> {
    fn new(command: WireCommand, values: &'a [Vec<u8>]) -> Result<Self, CommandError> {
        if values.len() != command.arity() {
            return Err(CommandError::malformed(format!(
                "{command} expects {} parameter(s), received {}",
                command.arity(),
                values.len()
            )));
        }
        Ok(Self { command, values })
    }

    const fn len(&self) -> usize {
        self.values.len()
    }

    fn bytes(&self, index: usize) -> &'a [u8] {
        self.values.get(index).map_or(&[][..], Vec::as_slice)
    }

    fn text(&self, index: usize) -> Result<&'a str, CommandError> {
        str::from_utf8(self.bytes(index)).map_err(|error| {
            CommandError::malformed(format!(
                "parameter {} of {} is not valid UTF-8: {error}",
                index + 1,
                self.command
            ))
        })
    }

    fn handle(&self, index: usize) -> Result<Handle, CommandError> {
        let text = self.text(index)?.trim();
        text.parse().map_err(|_| {
            CommandError::malformed(format!("'{text}' is not a valid process handle"))
        })
    }

    /// Decimal milliseconds; negative values wait zero time.
    fn millis(&self, index: usize) -> Result<Duration, CommandError> {
        let text = self.text(index)?.trim();
        let millis: i64 = text
            .parse()
            .map_err(|_| CommandError::malformed(format!("'{text}' is not a valid timeout")))?;
        Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
    }
}
