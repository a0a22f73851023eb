//! eGK read sequence
//!
//! [`EgkSession`] drives one card session over a [`SmartCardChannel`]:
//! terminal reset, card request, root select, card info files, HCA select,
//! then the patient (EF.PD) and insurance (EF.VD) containers. Only a missing
//! card, a failed root or HCA select, and a lost link end the session early;
//! every other failure is recorded as a warning and the affected fields stay
//! empty.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::mpsc;

use egk_common::{is_complete, recover, CardField, FieldSource};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::apdu::{commands, ApduCommand, ApduResponse, EXTENDED_MAX, SHORT_MAX};
use crate::channel::SmartCardChannel;
use crate::error::CardError;
use crate::profile::{CardProfile, ProfileTable};
use crate::status::{classify, CommandContext, StatusOutcome, Warning};

/// Short file identifiers and record numbers of the eGK file system
pub mod files {
    /// EF.ATR under MF, carries the I/O buffer sizes
    pub const SFI_ATR: u8 = 0x1D;
    /// EF.VERSION under MF, record 2 holds the product version
    pub const SFI_VERSION: u8 = 0x10;
    pub const VERSION_RECORD: u8 = 0x02;
    /// EF.StatusVD, schema version of the insurance data
    pub const SFI_STATUS_VD: u8 = 0x0C;
    pub const STATUS_VD_LEN: u8 = 0x19;
    /// EF.PD, patient data
    pub const SFI_PD: u8 = 0x01;
    /// EF.VD, insurance data
    pub const SFI_VD: u8 = 0x02;
    /// Size of the EF.PD length prefix; the container follows it
    pub const PD_LENGTH_LEN: u8 = 0x02;
    /// Size of the EF.VD offset block
    pub const VD_POINTER_LEN: u8 = 0x08;
}

/// Stage of the read sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStage {
    Idle,
    Connected,
    TerminalReset,
    CardRequested,
    RootSelected,
    ProfileResolved,
    HcaSelected,
    PatientRead,
    InsuranceRead,
    Complete,
    Aborted,
    Ejected,
    Disconnected,
}

/// Step of the read sequence, used to attribute warnings and aborts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    Connect,
    ResetTerminal,
    RequestCard,
    ResolveProfile,
    SelectRoot,
    ReadBufferSize,
    ReadVersion,
    ReadSchemaVersion,
    SelectHca,
    ReadPatient,
    ReadInsurance,
    EjectCard,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Connect => "connect",
            Step::ResetTerminal => "terminal reset",
            Step::RequestCard => "request card",
            Step::ResolveProfile => "resolve profile",
            Step::SelectRoot => "select root",
            Step::ReadBufferSize => "read EF.ATR",
            Step::ReadVersion => "read EF.VERSION",
            Step::ReadSchemaVersion => "read EF.StatusVD",
            Step::SelectHca => "select HCA",
            Step::ReadPatient => "read EF.PD",
            Step::ReadInsurance => "read EF.VD",
            Step::EjectCard => "eject card",
        };
        f.write_str(name)
    }
}

/// Non-fatal failure of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepWarning {
    pub step: Step,
    pub cause: String,
}

impl fmt::Display for StepWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.cause)
    }
}

/// Why a session ended before completing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbortReason {
    #[error("{step} failed: {outcome}")]
    Rejected { step: Step, outcome: StatusOutcome },

    #[error("{step} failed, card link lost: {cause}")]
    Transport { step: Step, cause: String },

    #[error("{step} failed: {cause}")]
    Failed { step: Step, cause: String },
}

impl AbortReason {
    pub fn step(&self) -> Step {
        match self {
            AbortReason::Rejected { step, .. }
            | AbortReason::Transport { step, .. }
            | AbortReason::Failed { step, .. } => *step,
        }
    }

    /// Classified status word when the card refused the command
    pub fn outcome(&self) -> Option<StatusOutcome> {
        match self {
            AbortReason::Rejected { outcome, .. } => Some(*outcome),
            _ => None,
        }
    }

    fn from_error(step: Step, error: CardError) -> Self {
        match error {
            CardError::CardRejected { outcome, .. } => AbortReason::Rejected { step, outcome },
            CardError::Transport(e) => AbortReason::Transport {
                step,
                cause: e.to_string(),
            },
            other => AbortReason::Failed {
                step,
                cause: other.to_string(),
            },
        }
    }
}

/// Card data read from the eGK
///
/// Every [`CardField`] is present; fields that are absent on the card or
/// could not be read hold an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CardData(BTreeMap<CardField, String>);

impl Default for CardData {
    fn default() -> Self {
        Self(CardField::ALL.into_iter().map(|f| (f, String::new())).collect())
    }
}

impl CardData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: CardField) -> &str {
        self.0.get(&field).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, field: CardField, value: impl Into<String>) {
        self.0.insert(field, value.into());
    }

    pub fn is_present(&self, field: CardField) -> bool {
        !self.get(field).is_empty()
    }

    /// All fields in catalogue order
    pub fn iter(&self) -> impl Iterator<Item = (CardField, &str)> {
        self.0.iter().map(|(field, value)| (*field, value.as_str()))
    }

    /// Fields of one source
    pub fn fields(&self, source: FieldSource) -> impl Iterator<Item = (CardField, &str)> {
        self.iter().filter(move |(field, _)| field.source() == source)
    }

    fn merge(&mut self, values: BTreeMap<CardField, String>) {
        self.0.extend(values);
    }
}

/// Event published while a session runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Warning(StepWarning),
    Complete(CardData),
    Aborted(AbortReason),
}

/// Receiver of session events
pub trait EventSink {
    fn emit(&mut self, event: SessionEvent);
}

impl EventSink for Vec<SessionEvent> {
    fn emit(&mut self, event: SessionEvent) {
        self.push(event);
    }
}

impl EventSink for mpsc::Sender<SessionEvent> {
    fn emit(&mut self, event: SessionEvent) {
        if self.send(event).is_err() {
            debug!("Session event receiver dropped");
        }
    }
}

/// Discards all events
impl EventSink for () {
    fn emit(&mut self, _event: SessionEvent) {}
}

/// Tunables of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Send EJECT ICC after the sequence ends
    pub eject_on_finish: bool,
    /// Send RESET CT and REQUEST ICC; readers without CT-BCS support skip both
    pub request_icc: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            eject_on_finish: true,
            request_icc: true,
        }
    }
}

/// Values gathered during a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub stage: SessionStage,
    /// Largest response the card can send, 0 when unknown
    pub max_buffer_size: usize,
    pub generation: String,
    pub schema_version: String,
    pub profile: String,
    #[serde(with = "hex_bytes")]
    pub atr: Vec<u8>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            stage: SessionStage::Idle,
            max_buffer_size: 0,
            generation: String::new(),
            schema_version: String::new(),
            profile: String::new(),
            atr: Vec::new(),
        }
    }
}

mod hex_bytes {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode_upper(bytes))
    }
}

/// Terminal outcome of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Complete(CardData),
    Aborted(AbortReason),
}

/// Everything a finished session produced
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    /// Last stage reached before completion or abort
    pub reached: SessionStage,
    pub state: SessionState,
    pub warnings: Vec<StepWarning>,
}

impl SessionReport {
    pub fn card_data(&self) -> Option<&CardData> {
        match &self.outcome {
            SessionOutcome::Complete(data) => Some(data),
            SessionOutcome::Aborted(_) => None,
        }
    }

    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match &self.outcome {
            SessionOutcome::Complete(_) => None,
            SessionOutcome::Aborted(reason) => Some(reason),
        }
    }
}

/// One read session over one card
pub struct EgkSession<'p, C: SmartCardChannel> {
    channel: C,
    profiles: &'p ProfileTable,
    options: SessionOptions,
    state: SessionState,
    data: CardData,
    warnings: Vec<StepWarning>,
    connected: bool,
}

impl<'p, C: SmartCardChannel> EgkSession<'p, C> {
    pub fn new(channel: C, profiles: &'p ProfileTable, options: SessionOptions) -> Self {
        Self {
            channel,
            profiles,
            options,
            state: SessionState::default(),
            data: CardData::new(),
            warnings: Vec::new(),
            connected: false,
        }
    }

    /// Run the read sequence to the end, publishing events to `sink`
    pub fn run<S: EventSink + ?Sized>(mut self, sink: &mut S) -> SessionReport {
        let result = self.sequence(sink);
        let reached = self.state.stage;

        let outcome = match result {
            Ok(()) => {
                self.advance(SessionStage::Complete);
                info!(
                    generation = %self.state.generation,
                    warnings = self.warnings.len(),
                    "Card read complete"
                );
                SessionOutcome::Complete(self.data.clone())
            }
            Err(reason) => {
                self.advance(SessionStage::Aborted);
                warn!(reason = %reason, "Card read aborted");
                SessionOutcome::Aborted(reason)
            }
        };

        self.cleanup(&outcome, sink);

        sink.emit(match &outcome {
            SessionOutcome::Complete(data) => SessionEvent::Complete(data.clone()),
            SessionOutcome::Aborted(reason) => SessionEvent::Aborted(reason.clone()),
        });

        SessionReport {
            outcome,
            reached,
            state: self.state,
            warnings: self.warnings,
        }
    }

    fn sequence<S: EventSink + ?Sized>(&mut self, sink: &mut S) -> Result<(), AbortReason> {
        let atr = self.channel.connect().map_err(|e| AbortReason::Transport {
            step: Step::Connect,
            cause: e.to_string(),
        })?;
        self.connected = true;
        self.data.set(CardField::Atr, hex::encode_upper(&atr));
        self.state.atr = atr;
        self.advance(SessionStage::Connected);

        let profile = self.resolve_profile(sink);

        if self.options.request_icc {
            if let Err(e) = self.exchange(CommandContext::ResetCt, &commands::reset_ct()) {
                self.warn(sink, Step::ResetTerminal, e.to_string());
            }
            self.advance(SessionStage::TerminalReset);

            self.exchange(CommandContext::RequestIcc, &commands::request_icc())
                .map_err(|e| AbortReason::from_error(Step::RequestCard, e))?;
            self.advance(SessionStage::CardRequested);
        }

        match &profile.root_select {
            Some(command) => {
                self.exchange(CommandContext::Select, command)
                    .map_err(|e| AbortReason::from_error(Step::SelectRoot, e))?;
            }
            None => debug!(profile = %profile.name, "Root select disabled"),
        }
        self.advance(SessionStage::RootSelected);

        self.read_card_info(sink);
        self.advance(SessionStage::ProfileResolved);

        self.exchange(CommandContext::Select, &commands::select_aid(&profile.hca_aid))
            .map_err(|e| AbortReason::from_error(Step::SelectHca, e))?;
        self.advance(SessionStage::HcaSelected);

        match self.read_patient() {
            Ok(text) => self.store_container(profile, FieldSource::Patient, CardField::PatientXml, text),
            Err(e) => self.warn(sink, Step::ReadPatient, e.to_string()),
        }
        self.advance(SessionStage::PatientRead);

        match self.read_insurance() {
            Ok(text) => self.store_container(profile, FieldSource::Insurance, CardField::InsuranceXml, text),
            Err(e) => self.warn(sink, Step::ReadInsurance, e.to_string()),
        }
        self.advance(SessionStage::InsuranceRead);

        Ok(())
    }

    fn resolve_profile<S: EventSink + ?Sized>(&mut self, sink: &mut S) -> &'p CardProfile {
        let profiles = self.profiles;
        let profile = match profiles.find(&self.state.atr) {
            Some(profile) => profile,
            None => {
                let cause = format!(
                    "no profile matches ATR {}, using {}",
                    hex::encode_upper(&self.state.atr),
                    profiles.default.name
                );
                self.warn(sink, Step::ResolveProfile, cause);
                &profiles.default
            }
        };
        debug!(profile = %profile.name, "Card profile selected");
        self.state.profile = profile.name.clone();
        profile
    }

    /// EF.ATR, EF.VERSION and EF.StatusVD, all best effort
    fn read_card_info<S: EventSink + ?Sized>(&mut self, sink: &mut S) {
        let response = self.exchange(
            CommandContext::ReadBinary,
            &commands::read_binary_sfi(files::SFI_ATR, 0x00),
        );
        match response.and_then(|r| parse_buffer_size(&r.data)) {
            Ok(size) => {
                debug!(max_buffer_size = size, "Buffer size negotiated");
                self.state.max_buffer_size = size;
                self.data.set(CardField::MaxBufferSize, size.to_string());
            }
            Err(e) => self.warn(sink, Step::ReadBufferSize, e.to_string()),
        }

        let response = self.exchange(
            CommandContext::ReadRecord,
            &commands::read_record(files::VERSION_RECORD, files::SFI_VERSION),
        );
        match response.and_then(|r| parse_generation(&r.data)) {
            Ok(code) => {
                let generation = self.profiles.generations.resolve(code);
                debug!(code = %hex::encode_upper(code), generation = %generation, "Card generation");
                self.data.set(CardField::CardGeneration, generation.clone());
                self.state.generation = generation;
            }
            Err(e) => self.warn(sink, Step::ReadVersion, e.to_string()),
        }

        let response = self.exchange(
            CommandContext::ReadBinary,
            &commands::read_binary_sfi(files::SFI_STATUS_VD, files::STATUS_VD_LEN),
        );
        match response.and_then(|r| parse_schema_version(&r.data)) {
            Ok(version) => {
                debug!(schema_version = %version, "Schema version");
                self.data.set(CardField::SchemaVersion, version.clone());
                self.state.schema_version = version;
            }
            Err(e) => self.warn(sink, Step::ReadSchemaVersion, e.to_string()),
        }
    }

    fn read_patient(&mut self) -> Result<String, CardError> {
        let response = self.exchange(
            CommandContext::ReadBinary,
            &commands::read_binary_sfi(files::SFI_PD, files::PD_LENGTH_LEN),
        )?;
        let len = read_u16(&response.data, 0)? as usize;
        debug!(len, "EF.PD container length");

        self.read_container(files::PD_LENGTH_LEN as usize, len)
    }

    fn read_insurance(&mut self) -> Result<String, CardError> {
        let response = self.exchange(
            CommandContext::ReadBinary,
            &commands::read_binary_sfi(files::SFI_VD, files::VD_POINTER_LEN),
        )?;
        let (start, end) = parse_vd_pointers(&response.data)?;
        let len = end.checked_sub(start).ok_or(CardError::ContainerLength {
            len: 0,
            reason: "end offset precedes start offset",
        })?;
        debug!(start, end, len, "EF.VD container bounds");

        self.read_container(start, len)
    }

    /// Read `len` bytes at `offset` of the selected file and recover the text
    fn read_container(&mut self, offset: usize, len: usize) -> Result<String, CardError> {
        let max_buffer = self.state.max_buffer_size;
        if max_buffer == 0 {
            warn!(len, "Buffer size unknown, only the extended length bound applies");
        }
        validate_container_length(len, max_buffer)?;

        let offset = u16::try_from(offset)
            .ok()
            .filter(|o| *o <= 0x7FFF)
            .ok_or(CardError::ContainerLength {
                len,
                reason: "offset not addressable by READ BINARY",
            })?;

        let mut command = commands::read_binary(offset, len);
        if max_buffer > SHORT_MAX {
            command = command.extended();
        }

        let response = self.exchange(CommandContext::ReadBinary, &command)?;
        if response.data.len() < len {
            debug!(expected = len, got = response.data.len(), "Short container read");
        }

        Ok(recover(&response.data)?)
    }

    fn store_container(&mut self, profile: &CardProfile, source: FieldSource, xml_field: CardField, text: String) {
        if !is_complete(&text) {
            warn!(?source, "Container ends mid-element, extracting complete tags only");
        }
        let values = profile.extract_all(&text, source);
        debug!(?source, extracted = values.len(), "Container fields extracted");
        self.data.merge(values);
        self.data.set(xml_field, text);
    }

    /// Send a command and classify its status word in `context`
    fn exchange(&mut self, context: CommandContext, command: &ApduCommand) -> Result<ApduResponse, CardError> {
        let response = command.send(&mut self.channel)?;
        let outcome = classify(context, response.status_word());
        match outcome {
            StatusOutcome::Success => Ok(response),
            StatusOutcome::SuccessWithWarning(Warning::EndOfFile) => {
                warn!(%context, len = response.data.len(), "End of file reached before Le bytes");
                Ok(response)
            }
            StatusOutcome::SuccessWithWarning(warning) => {
                debug!(%context, ?warning, "Command succeeded with warning");
                Ok(response)
            }
            outcome => Err(CardError::CardRejected {
                command: context,
                outcome,
            }),
        }
    }

    fn cleanup<S: EventSink + ?Sized>(&mut self, outcome: &SessionOutcome, sink: &mut S) {
        if !self.connected {
            return;
        }

        let link_lost = matches!(outcome, SessionOutcome::Aborted(AbortReason::Transport { .. }));
        if self.options.eject_on_finish && !link_lost {
            match command_outcome(&mut self.channel, CommandContext::EjectIcc, &commands::eject_icc()) {
                Ok(StatusOutcome::SuccessWithWarning(Warning::CardNotRemoved)) => {
                    self.warn(sink, Step::EjectCard, "card not removed in time".to_string());
                }
                Ok(outcome) if outcome.is_success() => debug!(%outcome, "Card ejected"),
                Ok(outcome) => self.warn(sink, Step::EjectCard, outcome.to_string()),
                Err(e) => self.warn(sink, Step::EjectCard, e.to_string()),
            }
            self.advance(SessionStage::Ejected);
        }

        self.channel.disconnect();
        self.connected = false;
        self.advance(SessionStage::Disconnected);
    }

    fn advance(&mut self, stage: SessionStage) {
        debug!(from = ?self.state.stage, to = ?stage, "Session stage");
        self.state.stage = stage;
    }

    fn warn<S: EventSink + ?Sized>(&mut self, sink: &mut S, step: Step, cause: String) {
        warn!(step = %step, cause = %cause, "Step failed");
        let warning = StepWarning { step, cause };
        sink.emit(SessionEvent::Warning(warning.clone()));
        self.warnings.push(warning);
    }
}

fn command_outcome<C: SmartCardChannel + ?Sized>(
    channel: &mut C,
    context: CommandContext,
    command: &ApduCommand,
) -> Result<StatusOutcome, CardError> {
    let response = command.send(channel)?;
    Ok(classify(context, response.status_word()))
}

fn read_u16(data: &[u8], offset: usize) -> Result<u16, CardError> {
    match data.get(offset..offset + 2) {
        Some(bytes) => Ok(u16::from_be_bytes([bytes[0], bytes[1]])),
        None => Err(CardError::InvalidResponse {
            needed: offset + 2,
            got: data.len(),
        }),
    }
}

/// Largest response size from EF.ATR: bytes 12-13 minus the status word
pub fn parse_buffer_size(data: &[u8]) -> Result<usize, CardError> {
    let size = read_u16(data, 12)? as usize;
    Ok(size.saturating_sub(2))
}

/// Version code from EF.VERSION record 2: bytes 1, 2 and 4
pub fn parse_generation(data: &[u8]) -> Result<[u8; 3], CardError> {
    if data.len() < 5 {
        return Err(CardError::InvalidResponse {
            needed: 5,
            got: data.len(),
        });
    }
    Ok([data[1], data[2], data[4]])
}

/// Schema version from EF.StatusVD: bytes 16, 17 and 19, dot-joined
pub fn parse_schema_version(data: &[u8]) -> Result<String, CardError> {
    if data.len() < 20 {
        return Err(CardError::InvalidResponse {
            needed: 20,
            got: data.len(),
        });
    }
    Ok(format!("{:X}.{:X}.{:X}", data[16], data[17], data[19]))
}

/// Start and end offsets of the unprotected insurance container
pub fn parse_vd_pointers(data: &[u8]) -> Result<(usize, usize), CardError> {
    let start = read_u16(data, 0)? as usize;
    let end = read_u16(data, 2)? as usize;
    Ok((start, end))
}

/// Check a declared container length before reading it
///
/// `max_buffer` of 0 means the card's buffer size is unknown.
pub fn validate_container_length(len: usize, max_buffer: usize) -> Result<(), CardError> {
    let reason = if len == 0 {
        "container is empty"
    } else if len > EXTENDED_MAX {
        "exceeds 65535 bytes"
    } else if max_buffer > 0 && len > max_buffer {
        "exceeds the card's buffer size"
    } else {
        return Ok(());
    };
    Err(CardError::ContainerLength { len, reason })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_buffer_size() {
        let mut data = vec![0u8; 12];
        data.extend_from_slice(&[0x02, 0x34, 0xAA, 0xBB]);
        assert_eq!(parse_buffer_size(&data).unwrap(), 562);

        assert!(matches!(
            parse_buffer_size(&[0u8; 13]),
            Err(CardError::InvalidResponse { needed: 14, got: 13 })
        ));
    }

    #[test]
    fn test_parse_generation() {
        assert_eq!(parse_generation(&[0xEF, 0x40, 0x00, 0x99, 0x00]).unwrap(), [0x40, 0x00, 0x00]);
        assert_eq!(
            parse_generation(&[0xEF, 0x30, 0x00, 0x02, 0x01, 0xFF]).unwrap(),
            [0x30, 0x00, 0x01]
        );
        assert!(parse_generation(&[0x00; 4]).is_err());
    }

    #[test]
    fn test_parse_schema_version() {
        let mut data = vec![0u8; 25];
        data[16] = 0x05;
        data[17] = 0x02;
        data[18] = 0xFF;
        data[19] = 0x01;
        assert_eq!(parse_schema_version(&data).unwrap(), "5.2.1");

        data[16] = 0x10;
        assert_eq!(parse_schema_version(&data).unwrap(), "10.2.1");

        assert!(parse_schema_version(&data[..19]).is_err());
    }

    #[test]
    fn test_parse_vd_pointers() {
        let data = [0x00, 0x08, 0x01, 0x77, 0x01, 0x78, 0x02, 0x00];
        assert_eq!(parse_vd_pointers(&data).unwrap(), (8, 375));
        assert!(parse_vd_pointers(&data[..3]).is_err());
    }

    #[test]
    fn test_validate_container_length() {
        assert!(validate_container_length(400, 562).is_ok());
        assert!(validate_container_length(562, 562).is_ok());
        assert!(validate_container_length(600, 0).is_ok());
        assert!(matches!(
            validate_container_length(0, 562),
            Err(CardError::ContainerLength { len: 0, .. })
        ));
        assert!(matches!(
            validate_container_length(563, 562),
            Err(CardError::ContainerLength { len: 563, .. })
        ));
        assert!(matches!(
            validate_container_length(70_000, 0),
            Err(CardError::ContainerLength { len: 70_000, .. })
        ));
        assert!(matches!(
            validate_container_length(70_000, 100_000),
            Err(CardError::ContainerLength { len: 70_000, .. })
        ));
    }

    #[test]
    fn test_card_data_has_every_field() {
        let mut data = CardData::new();
        assert_eq!(data.iter().count(), CardField::ALL.len());
        assert!(data.iter().all(|(_, value)| value.is_empty()));

        data.set(CardField::FirstName, "Anna");
        assert_eq!(data.get(CardField::FirstName), "Anna");
        assert!(data.is_present(CardField::FirstName));
        assert!(!data.is_present(CardField::LastName));
        assert_eq!(data.fields(FieldSource::Card).count(), 6);
    }

    #[test]
    fn test_abort_reason_accessors() {
        let reason = AbortReason::from_error(
            Step::SelectHca,
            CardError::CardRejected {
                command: CommandContext::Select,
                outcome: StatusOutcome::NotFound,
            },
        );
        assert_eq!(reason.step(), Step::SelectHca);
        assert_eq!(reason.outcome(), Some(StatusOutcome::NotFound));
        assert_eq!(reason.to_string(), "select HCA failed: not found");
    }
}
