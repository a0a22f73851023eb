//! Smart card channel abstraction
//!
//! The read sequence only needs a way to exchange APDUs with a card. Reader
//! discovery and the physical link belong to the channel implementation
//! (see [`crate::reader::PcscChannel`]).

use thiserror::Error;

/// Failures of the link between host and card
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no card channel established")]
    NotConnected,

    #[error("PC/SC error: {0}")]
    Pcsc(#[from] pcsc::Error),

    #[error("card link lost: {0}")]
    LinkLost(String),
}

/// Half-duplex request/response link to one card
///
/// Implementations must fail fast with a [`TransportError`] once the link is
/// gone, so a disconnect from another thread ends the session at the next
/// exchange.
pub trait SmartCardChannel {
    /// Establish the link and return the card's ATR
    fn connect(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Send one command APDU and return the full reply including the status word
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Release the link; never fails
    fn disconnect(&mut self);
}

impl<C: SmartCardChannel + ?Sized> SmartCardChannel for &mut C {
    fn connect(&mut self) -> Result<Vec<u8>, TransportError> {
        (**self).connect()
    }

    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).transmit(apdu)
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }
}

impl<C: SmartCardChannel + ?Sized> SmartCardChannel for Box<C> {
    fn connect(&mut self) -> Result<Vec<u8>, TransportError> {
        (**self).connect()
    }

    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).transmit(apdu)
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }
}
