//! Length-prefixed request and response frames.
//!
//! Frames are read and written through blocking [`Read`]/[`Write`] streams.
//! Reading enforces [`FrameLimits`] before allocating parameter buffers so a
//! hostile length prefix cannot exhaust memory.

use std::borrow::Cow;
use std::io::{self, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::error::{CommandError, ErrorKind};

/// Width of the space-padded command name field.
pub const COMMAND_FIELD_LEN: usize = 20;

/// Length value terminating the parameter list.
pub const END_OF_PARAMETERS: i32 = -1;

const LENGTH_PREFIX_LEN: usize = 4;

/// Bounds enforced while decoding frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    /// Maximum number of parameters accepted in one request.
    pub max_parameters: usize,
    /// Maximum size of a single parameter or response payload.
    pub max_payload_bytes: usize,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_parameters: 16,
            max_payload_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The peer closed the connection in the middle of a frame.
    #[error("connection closed before the frame was complete")]
    Truncated,
    /// The command field is not valid UTF-8.
    #[error("command name is not valid UTF-8")]
    CommandEncoding,
    /// The command name does not fit the fixed-width field.
    #[error("command name '{name}' exceeds {max} bytes")]
    CommandTooLong {
        /// Offending name.
        name: String,
        /// Field width.
        max: usize,
    },
    /// A length prefix was negative (other than the terminator).
    #[error("invalid length prefix {length}")]
    InvalidLength {
        /// Decoded length value.
        length: i32,
    },
    /// A parameter or payload exceeds the configured limit.
    #[error("payload of {length} bytes exceeds the {max} byte limit")]
    PayloadTooLarge {
        /// Declared payload size.
        length: usize,
        /// Configured limit.
        max: usize,
    },
    /// The request declares more parameters than allowed.
    #[error("request carries more than {max} parameters")]
    TooManyParameters {
        /// Configured limit.
        max: usize,
    },
    /// The underlying stream failed.
    #[error("frame I/O failed: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for FrameError {
    fn from(error: io::Error) -> Self {
        if error.kind() == io::ErrorKind::UnexpectedEof {
            Self::Truncated
        } else {
            Self::Io(error)
        }
    }
}

/// Request frame: a command name plus raw parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    command: String,
    parameters: Vec<Vec<u8>>,
}

impl RequestFrame {
    /// Creates a frame without parameters.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            parameters: Vec::new(),
        }
    }

    /// Appends a parameter, builder style.
    #[must_use]
    pub fn with_parameter(mut self, parameter: impl Into<Vec<u8>>) -> Self {
        self.parameters.push(parameter.into());
        self
    }

    /// Command name with padding removed.
    #[must_use]
    pub fn command(&self) -> &str {
        self.command.trim()
    }

    /// Raw parameters in frame order.
    #[must_use]
    pub fn parameters(&self) -> &[Vec<u8>] {
        &self.parameters
    }

    /// Encodes the frame into a contiguous buffer.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::CommandTooLong`] when the name does not fit the
    /// command field, or [`FrameError::PayloadTooLarge`] when a parameter
    /// cannot be described by a four byte length.
    pub fn encode(&self) -> Result<Bytes, FrameError> {
        let name = self.command.as_bytes();
        if name.len() > COMMAND_FIELD_LEN {
            return Err(FrameError::CommandTooLong {
                name: self.command.clone(),
                max: COMMAND_FIELD_LEN,
            });
        }
        let body: usize = self
            .parameters
            .iter()
            .map(|parameter| parameter.len() + LENGTH_PREFIX_LEN)
            .sum();
        let mut buffer = BytesMut::with_capacity(COMMAND_FIELD_LEN + body + LENGTH_PREFIX_LEN);
        buffer.put_slice(name);
        buffer.put_bytes(b' ', COMMAND_FIELD_LEN - name.len());
        for parameter in &self.parameters {
            buffer.put_i32(length_prefix(parameter.len())?);
            buffer.put_slice(parameter);
        }
        buffer.put_i32(END_OF_PARAMETERS);
        Ok(buffer.freeze())
    }

    /// Encodes and writes the frame, then flushes the stream.
    ///
    /// # Errors
    ///
    /// Returns encoding errors from [`Self::encode`] or stream failures.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), FrameError> {
        let encoded = self.encode()?;
        writer.write_all(&encoded)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads one request frame from the stream.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Truncated`] if the stream ends early, or a limit
    /// or encoding error when the frame is malformed.
    pub fn read_from<R: Read>(reader: &mut R, limits: FrameLimits) -> Result<Self, FrameError> {
        let mut field = [0_u8; COMMAND_FIELD_LEN];
        reader.read_exact(&mut field)?;
        let command = std::str::from_utf8(&field)
            .map_err(|_| FrameError::CommandEncoding)?
            .trim()
            .to_owned();

        let mut parameters = Vec::new();
        loop {
            let length = read_i32(reader)?;
            if length == END_OF_PARAMETERS {
                break;
            }
            if parameters.len() == limits.max_parameters {
                return Err(FrameError::TooManyParameters {
                    max: limits.max_parameters,
                });
            }
            parameters.push(read_payload(reader, length, limits.max_payload_bytes)?);
        }

        Ok(Self {
            command,
            parameters,
        })
    }
}

/// Response frame: a result code plus a UTF-8 payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    code: i32,
    payload: Vec<u8>,
}

impl ResponseFrame {
    /// Builds a response from raw parts.
    pub fn new(code: i32, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            payload: payload.into(),
        }
    }

    /// Successful response carrying `text`.
    pub fn success(text: impl Into<String>) -> Self {
        Self::new(ErrorKind::SUCCESS_CODE, text.into().into_bytes())
    }

    /// Failure response for a handler error.
    #[must_use]
    pub fn from_error(error: &CommandError) -> Self {
        Self::new(error.code(), error.message().as_bytes().to_vec())
    }

    /// Result code.
    #[must_use]
    pub const fn code(&self) -> i32 {
        self.code
    }

    /// Returns `true` for result code `0`.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code == ErrorKind::SUCCESS_CODE
    }

    /// Raw payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// Converts the response into the handler result it describes.
    ///
    /// # Errors
    ///
    /// Returns the [`CommandError`] encoded by a non-zero result code.
    pub fn into_result(self) -> Result<String, CommandError> {
        let text = self.text().into_owned();
        if self.is_success() {
            Ok(text)
        } else {
            Err(CommandError::from_response(self.code, text))
        }
    }

    /// Encodes the response frame.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::PayloadTooLarge`] when the payload length does
    /// not fit the four byte prefix.
    pub fn encode(&self) -> Result<Bytes, FrameError> {
        let mut buffer = BytesMut::with_capacity(2 * LENGTH_PREFIX_LEN + self.payload.len());
        buffer.put_i32(self.code);
        buffer.put_i32(length_prefix(self.payload.len())?);
        buffer.put_slice(&self.payload);
        Ok(buffer.freeze())
    }

    /// Encodes and writes the response, then flushes the stream.
    ///
    /// # Errors
    ///
    /// Returns encoding or stream failures.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), FrameError> {
        let encoded = self.encode()?;
        writer.write_all(&encoded)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads one response frame.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Truncated`] if the stream ends early or a limit
    /// error when the declared payload is too large.
    pub fn read_from<R: Read>(reader: &mut R, limits: FrameLimits) -> Result<Self, FrameError> {
        let code = read_i32(reader)?;
        let length = read_i32(reader)?;
        let payload = read_payload(reader, length, limits.max_payload_bytes)?;
        Ok(Self { code, payload })
    }
}

fn length_prefix(length: usize) -> Result<i32, FrameError> {
    i32::try_from(length).map_err(|_| FrameError::PayloadTooLarge {
        length,
        max: i32::MAX as usize,
    })
}

fn read_i32<R: Read>(reader: &mut R) -> Result<i32, FrameError> {
    let mut prefix = [0_u8; LENGTH_PREFIX_LEN];
    reader.read_exact(&mut prefix)?;
    Ok(i32::from_be_bytes(prefix))
}

fn read_payload<R: Read>(reader: &mut R, length: i32, max: usize) -> Result<Vec<u8>, FrameError> {
    let length = usize::try_from(length).map_err(|_| FrameError::InvalidLength { length })?;
    if length > max {
        return Err(FrameError::PayloadTooLarge { length, max });
    }
    let mut payload = vec![0_u8; length];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rstest::rstest;

    use super::*;

    #[test]
    fn request_layout_matches_wire_contract() {
        let frame = RequestFrame::new("get").with_parameter("a.txt");
        let encoded = frame.encode().expect("encode");

        let mut expected = b"get                 ".to_vec();
        expected.extend_from_slice(&[0, 0, 0, 5]);
        expected.extend_from_slice(b"a.txt");
        expected.extend_from_slice(&[0xff, 0xff, 0xff, 0xff]);
        assert_eq!(encoded.as_ref(), expected.as_slice());
    }

    #[test]
    fn response_layout_matches_wire_contract() {
        let encoded = ResponseFrame::new(-2, b"no".to_vec())
            .encode()
            .expect("encode");
        assert_eq!(
            encoded.as_ref(),
            &[0xff, 0xff, 0xff, 0xfe, 0, 0, 0, 2, b'n', b'o']
        );
    }

    #[test]
    fn request_decodes_parameters_in_order() {
        let frame = RequestFrame::new("PUT")
            .with_parameter("dir/file.txt")
            .with_parameter(Vec::new())
            .with_parameter(vec![0_u8, 1, 2]);
        let encoded = frame.encode().expect("encode");

        let decoded = RequestFrame::read_from(&mut Cursor::new(encoded), FrameLimits::default())
            .expect("decode");
        assert_eq!(decoded.command(), "PUT");
        assert_eq!(decoded.parameters(), frame.parameters());
    }

    #[test]
    fn rejects_oversized_command_names() {
        let error = RequestFrame::new("a-command-name-too-long")
            .encode()
            .expect_err("name too long");
        assert!(matches!(error, FrameError::CommandTooLong { .. }));
    }

    #[test]
    fn missing_terminator_is_truncated() {
        let mut bytes = b"exists              ".to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 1, b'x']);
        let error = RequestFrame::read_from(&mut Cursor::new(bytes), FrameLimits::default())
            .expect_err("truncated");
        assert!(matches!(error, FrameError::Truncated));
    }

    #[rstest]
    #[case::negative(-7)]
    #[case::min(i32::MIN)]
    fn rejects_negative_lengths(#[case] length: i32) {
        let mut bytes = b"get                 ".to_vec();
        bytes.extend_from_slice(&length.to_be_bytes());
        let error = RequestFrame::read_from(&mut Cursor::new(bytes), FrameLimits::default())
            .expect_err("negative length");
        assert!(matches!(error, FrameError::InvalidLength { .. }));
    }

    #[test]
    fn enforces_payload_limit_before_allocating() {
        let mut bytes = b"put                 ".to_vec();
        bytes.extend_from_slice(&1_000_i32.to_be_bytes());
        let limits = FrameLimits {
            max_parameters: 4,
            max_payload_bytes: 16,
        };
        let error =
            RequestFrame::read_from(&mut Cursor::new(bytes), limits).expect_err("too large");
        assert!(matches!(
            error,
            FrameError::PayloadTooLarge {
                length: 1_000,
                max: 16
            }
        ));
    }

    #[test]
    fn enforces_parameter_count_limit() {
        let mut frame = RequestFrame::new("get");
        for _ in 0..3 {
            frame = frame.with_parameter("x");
        }
        let encoded = frame.encode().expect("encode");
        let limits = FrameLimits {
            max_parameters: 2,
            max_payload_bytes: 16,
        };
        let error =
            RequestFrame::read_from(&mut Cursor::new(encoded), limits).expect_err("too many");
        assert!(matches!(error, FrameError::TooManyParameters { max: 2 }));
    }

    #[test]
    fn response_maps_codes_to_results() {
        let ok = ResponseFrame::success("1").into_result();
        assert_eq!(ok, Ok(String::from("1")));

        let error = ResponseFrame::new(-1, b"frob".to_vec())
            .into_result()
            .expect_err("unknown command");
        assert_eq!(error.kind(), ErrorKind::UnknownCommand);
        assert_eq!(error.message(), "frob");
    }
}
