//! Wire protocol and shared contract for the procd process daemon.
//!
//! The daemon and its clients exchange exactly one request and one response
//! per TCP connection. A request frame carries a fixed-width command name and
//! a list of length-prefixed parameters; the response frame carries a signed
//! result code and a UTF-8 payload. Process requests and results travel as
//! JSON documents inside those byte payloads.
//!
//! # Layout
//!
//! ```text
//! request:  [20 bytes command, space padded] ([i32 len][len bytes])* [i32 -1]
//! response: [i32 code] [i32 len] [len bytes UTF-8]
//! ```
//!
//! All integers are big-endian. Result code `0` means success, negative codes
//! are framework failures (see [`ErrorKind`]) and positive codes are command
//! failures whose payload carries the error text.
//!
//! The [`CommandHandler`] trait is the contract shared by the in-process
//! handler in `procd-exec` and the remote stub in `procd-client`, so callers
//! cannot tell the local path from the remote one.

mod command;
mod document;
mod error;
pub mod frame;
mod handler;

pub use self::command::{WireCommand, WireCommandParseError};
pub use self::document::{
    DocumentError, FRAMEWORK_RESULT_CODE, Handle, ProcessRequest, ProcessResult, ResultStatus,
    strip_control_characters,
};
pub use self::error::{CommandError, ErrorKind};
pub use self::frame::{FrameError, FrameLimits, RequestFrame, ResponseFrame};
pub use self::handler::CommandHandler;
