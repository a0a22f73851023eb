//! EGK Card - Reading German health insurance cards
//!
//! This crate talks to an eGK through a PC/SC reader (or any other
//! [`SmartCardChannel`]) and runs the GEMATIK read sequence to recover the
//! patient and insurance data stored on the card.

pub mod apdu;
pub mod channel;
pub mod error;
pub mod profile;
pub mod protocol;
pub mod reader;
pub mod status;

pub use apdu::{ApduCommand, ApduResponse, EncodingError};
pub use channel::{SmartCardChannel, TransportError};
pub use error::CardError;
pub use profile::{BuiltinProfiles, CardProfile, ProfileError, ProfileFile, ProfileSource, ProfileTable};
pub use protocol::{
    AbortReason, CardData, EgkSession, EventSink, SessionEvent, SessionOptions, SessionOutcome, SessionReport,
    SessionStage, SessionState, Step, StepWarning,
};
pub use reader::{CardReader, PcscChannel};
pub use status::{classify, CommandContext, StatusOutcome, Warning};

/// Re-export commonly used types
pub use egk_common::{CardField, FieldSource};
pub use pcsc::{Context, Error as PcscError};
