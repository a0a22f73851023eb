//! Error types for card operations

use egk_common::ContainerError;
use thiserror::Error;

use crate::apdu::EncodingError;
use crate::channel::TransportError;
use crate::status::{CommandContext, StatusOutcome};

/// Errors from a single step of the read sequence
#[derive(Debug, Error)]
pub enum CardError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("APDU encoding failed: {0}")]
    Encoding(#[from] EncodingError),

    #[error("malformed response: {len} bytes, no status word")]
    MalformedResponse { len: usize },

    #[error("{command} rejected by card: {outcome}")]
    CardRejected {
        command: CommandContext,
        outcome: StatusOutcome,
    },

    #[error("response too short: need {needed} bytes, got {got}")]
    InvalidResponse { needed: usize, got: usize },

    #[error("container length {len} not readable: {reason}")]
    ContainerLength { len: usize, reason: &'static str },

    #[error(transparent)]
    Container(#[from] ContainerError),
}
