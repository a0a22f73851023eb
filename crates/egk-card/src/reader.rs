//! PC/SC card reader management

use std::ffi::{CStr, CString};
use std::time::Duration;

use pcsc::{Card, Context, Disposition, Protocols, ReaderState, Scope, ShareMode, State, MAX_BUFFER_SIZE_EXTENDED};
use tracing::{debug, warn};

use crate::channel::{SmartCardChannel, TransportError};

/// Card reader wrapper for managing PC/SC connections
pub struct CardReader {
    context: Context,
}

impl CardReader {
    /// Create a new CardReader by establishing a PC/SC context
    pub fn new() -> Result<Self, pcsc::Error> {
        let context = Context::establish(Scope::User)?;
        Ok(Self { context })
    }

    /// List all available card readers
    pub fn list_readers(&self) -> Result<Vec<String>, pcsc::Error> {
        let mut readers_buf = [0; 2048];
        let readers = self.context.list_readers(&mut readers_buf)?;

        Ok(readers
            .map(|r| r.to_string_lossy().into_owned())
            .collect())
    }

    /// Channel to the first available reader
    pub fn first_channel(&self) -> Result<PcscChannel, pcsc::Error> {
        let mut readers_buf = [0; 2048];
        let mut readers = self.context.list_readers(&mut readers_buf)?;

        match readers.next() {
            Some(reader) => Ok(PcscChannel::new(self.context.clone(), reader.to_owned())),
            None => Err(pcsc::Error::NoReadersAvailable),
        }
    }

    /// Channel to a specific reader by name
    pub fn channel(&self, reader_name: &str) -> Result<PcscChannel, pcsc::Error> {
        let name = CString::new(reader_name).map_err(|_| pcsc::Error::UnknownReader)?;
        if !self.list_readers()?.iter().any(|r| r == reader_name) {
            return Err(pcsc::Error::UnknownReader);
        }
        Ok(PcscChannel::new(self.context.clone(), name))
    }

    /// Check whether a card is inserted in the given reader
    pub fn card_present(&self, reader_name: &CStr) -> Result<bool, pcsc::Error> {
        let mut states = [ReaderState::new(reader_name.to_owned(), State::UNAWARE)];
        self.context
            .get_status_change(Duration::from_millis(0), &mut states)?;
        Ok(states[0].event_state().contains(State::PRESENT))
    }
}

/// [`SmartCardChannel`] over a PC/SC reader
pub struct PcscChannel {
    context: Context,
    reader: CString,
    card: Option<Card>,
}

impl PcscChannel {
    pub fn new(context: Context, reader: CString) -> Self {
        Self {
            context,
            reader,
            card: None,
        }
    }

    /// Reader name as reported by PC/SC
    pub fn reader_name(&self) -> String {
        self.reader.to_string_lossy().into_owned()
    }

    pub fn reader(&self) -> &CStr {
        &self.reader
    }
}

impl SmartCardChannel for PcscChannel {
    fn connect(&mut self) -> Result<Vec<u8>, TransportError> {
        let card = self
            .context
            .connect(&self.reader, ShareMode::Shared, Protocols::ANY)?;
        let status = card.status2_owned()?;
        let atr = status.atr().to_vec();
        debug!(reader = %self.reader_name(), atr = %hex::encode_upper(&atr), "Card connected");
        self.card = Some(card);
        Ok(atr)
    }

    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        let card = self.card.as_ref().ok_or(TransportError::NotConnected)?;
        let mut rapdu_buf = vec![0; MAX_BUFFER_SIZE_EXTENDED];
        let rapdu = card.transmit(apdu, &mut rapdu_buf)?;
        Ok(rapdu.to_vec())
    }

    fn disconnect(&mut self) {
        if let Some(card) = self.card.take() {
            if let Err((_, err)) = card.disconnect(Disposition::ResetCard) {
                warn!(error = %err, "Card disconnect failed");
            }
        }
    }
}

impl Drop for PcscChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}
