//! Command names understood by the daemon.

use strum::{Display, EnumString};

/// Commands carried in the fixed-width name field of a request frame.
///
/// Names are matched case-insensitively after trimming the space padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum WireCommand {
    /// `get <path>`: returns the text content of a file.
    Get,
    /// `put <path> <text>`: writes a UTF-8 text file.
    Put,
    /// `putbinary <path> <bytes>`: writes a binary file.
    PutBinary,
    /// `mkdir <path>`: creates a directory and its parents.
    Mkdir,
    /// `rm <path>`: removes a file or directory tree.
    Rm,
    /// `exists <path>`: answers `"1"` or `"0"`.
    Exists,
    /// `execprocess <request document>`: runs a process template.
    ExecProcess,
    /// `waitforprocess <handle> <timeout millis>`: polls a detached process.
    WaitForProcess,
}

/// Error returned for names outside [`WireCommand`].
pub type WireCommandParseError = strum::ParseError;

impl WireCommand {
    /// Parses a padded command field.
    ///
    /// # Errors
    ///
    /// Returns [`WireCommandParseError`] when the trimmed name is not a known
    /// command.
    pub fn parse(name: &str) -> Result<Self, WireCommandParseError> {
        name.trim().parse()
    }

    /// Number of parameters the command expects.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Self::Get | Self::Mkdir | Self::Rm | Self::Exists | Self::ExecProcess => 1,
            Self::Put | Self::PutBinary | Self::WaitForProcess => 2,
        }
    }
}
