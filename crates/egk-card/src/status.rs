//! Status word classification
//!
//! The meaning of a status word depends on the command that produced it:
//! `6200` after REQUEST ICC means no card was inserted in time, while after
//! EJECT ICC it means the card was not taken out in time.

use std::fmt;

/// Status Word constants used by the eGK read sequence
pub struct SW;

impl SW {
    pub const SUCCESS: u16 = 0x9000;
    pub const SUCCESS_ALT: u16 = 0x9001;
    pub const WARNING: u16 = 0x6200;
    pub const WARNING_EOF: u16 = 0x6282;
    pub const EXEC_ERROR: u16 = 0x6400;
    pub const FILE_NOT_FOUND: u16 = 0x6A82;
}

/// Command a status word answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandContext {
    ResetCt,
    RequestIcc,
    EjectIcc,
    Select,
    ReadBinary,
    ReadRecord,
}

impl fmt::Display for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandContext::ResetCt => "RESET CT",
            CommandContext::RequestIcc => "REQUEST ICC",
            CommandContext::EjectIcc => "EJECT ICC",
            CommandContext::Select => "SELECT",
            CommandContext::ReadBinary => "READ BINARY",
            CommandContext::ReadRecord => "READ RECORD",
        };
        f.write_str(name)
    }
}

/// Non-fatal condition reported alongside a successful command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Warning {
    /// REQUEST ICC: an asynchronous (processor) card was presented
    AsynchronousCard,
    /// EJECT ICC: the card has been removed
    CardRemoved,
    /// EJECT ICC: the card was not removed within the timer
    CardNotRemoved,
    /// READ: end of file reached before Le bytes were read
    EndOfFile,
}

/// Semantic outcome of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusOutcome {
    Success,
    SuccessWithWarning(Warning),
    /// Application or file not found, or no card presented after REQUEST ICC
    NotFound,
    /// Reset of the terminal or the card was not successful
    ResetFailed,
    Unknown(u16),
}

impl StatusOutcome {
    /// Whether the command did what was asked
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            StatusOutcome::Success | StatusOutcome::SuccessWithWarning(_)
        )
    }
}

impl fmt::Display for StatusOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusOutcome::Success => f.write_str("success"),
            StatusOutcome::SuccessWithWarning(warning) => write!(f, "success with warning ({:?})", warning),
            StatusOutcome::NotFound => f.write_str("not found"),
            StatusOutcome::ResetFailed => f.write_str("reset failed"),
            StatusOutcome::Unknown(sw) => write!(f, "unknown status {:04X}", sw),
        }
    }
}

/// Classify a status word in the context of the command that produced it
pub fn classify(context: CommandContext, sw: u16) -> StatusOutcome {
    use CommandContext::*;

    match (context, sw) {
        (_, SW::SUCCESS) => StatusOutcome::Success,

        (RequestIcc, SW::SUCCESS_ALT) => StatusOutcome::SuccessWithWarning(Warning::AsynchronousCard),
        (RequestIcc, SW::WARNING) => StatusOutcome::NotFound,
        (RequestIcc | ResetCt, SW::EXEC_ERROR) => StatusOutcome::ResetFailed,

        (EjectIcc, SW::SUCCESS_ALT) => StatusOutcome::SuccessWithWarning(Warning::CardRemoved),
        (EjectIcc, SW::WARNING) => StatusOutcome::SuccessWithWarning(Warning::CardNotRemoved),

        (ReadBinary | ReadRecord, SW::WARNING_EOF) => StatusOutcome::SuccessWithWarning(Warning::EndOfFile),

        (Select | ReadBinary | ReadRecord, SW::FILE_NOT_FOUND) => StatusOutcome::NotFound,

        (_, other) => StatusOutcome::Unknown(other),
    }
}
