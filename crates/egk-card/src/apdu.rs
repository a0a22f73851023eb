//! APDU (Application Protocol Data Unit) command handling

use thiserror::Error;
use tracing::debug;

use crate::channel::SmartCardChannel;
use crate::error::CardError;

/// Largest Le/Lc representable in a single byte
pub const SHORT_MAX: usize = 255;

/// Largest Le/Lc representable in the extended (two byte) form
pub const EXTENDED_MAX: usize = 65_535;

/// Errors raised while encoding a command APDU
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("command data too long: {0} bytes (max 65535)")]
    DataTooLong(usize),

    #[error("expected length {0} is outside 1..=65535")]
    LeOutOfRange(usize),

    #[error("invalid APDU template: {0}")]
    InvalidTemplate(String),
}

/// APDU response containing data and status word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    /// Response data (without status word)
    pub data: Vec<u8>,
    /// Status word SW1
    pub sw1: u8,
    /// Status word SW2
    pub sw2: u8,
}

impl ApduResponse {
    /// Split a raw reply into data and status word
    pub fn parse(reply: &[u8]) -> Result<Self, CardError> {
        if reply.len() < 2 {
            return Err(CardError::MalformedResponse { len: reply.len() });
        }

        let (data, sw) = reply.split_at(reply.len() - 2);
        Ok(Self {
            data: data.to_vec(),
            sw1: sw[0],
            sw2: sw[1],
        })
    }

    /// Check if the response indicates success (9000)
    pub fn is_success(&self) -> bool {
        self.sw1 == 0x90 && self.sw2 == 0x00
    }

    /// Get the full status word as a 16-bit value
    pub fn status_word(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Get status word as hex string (e.g., "9000")
    pub fn status_string(&self) -> String {
        format!("{:02X}{:02X}", self.sw1, self.sw2)
    }
}

/// Expected response length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Le {
    /// Raw short Le byte, `0x00` requests up to 256 bytes
    Short(u8),
    /// Number of bytes expected; the encoding is chosen at build time
    Length(usize),
}

/// Send a raw APDU over the channel and parse the reply
pub fn send_apdu<C>(channel: &mut C, apdu: &[u8]) -> Result<ApduResponse, CardError>
where
    C: SmartCardChannel + ?Sized,
{
    debug!(apdu = %hex::encode_upper(apdu), "Sending APDU");
    let reply = channel.transmit(apdu)?;
    let response = ApduResponse::parse(&reply)?;
    debug!(
        sw = %response.status_string(),
        len = response.data.len(),
        "APDU response"
    );
    Ok(response)
}

/// APDU command builder
///
/// The ISO 7816-4 case follows from the fields that are set: no data and no
/// Le is case 1, Le only is case 2, data only is case 3, both is case 4.
/// Extended length fields are used when the data or the expected length
/// exceed 255 bytes, or when requested with [`ApduCommand::extended`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduCommand {
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    data: Vec<u8>,
    le: Option<Le>,
    extended: bool,
}

impl ApduCommand {
    /// Create a new APDU command
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: None,
            extended: false,
        }
    }

    /// Set command data
    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Set a raw short Le byte
    pub fn le(mut self, le: u8) -> Self {
        self.le = Some(Le::Short(le));
        self
    }

    /// Set the number of response bytes expected
    pub fn expected_len(mut self, len: usize) -> Self {
        self.le = Some(Le::Length(len));
        self
    }

    /// Force extended length encoding even for short lengths
    pub fn extended(mut self) -> Self {
        self.extended = true;
        self
    }

    fn uses_extended(&self) -> bool {
        self.extended
            || self.data.len() > SHORT_MAX
            || matches!(self.le, Some(Le::Length(len)) if len > SHORT_MAX)
    }

    /// Build the APDU command bytes
    pub fn build(&self) -> Result<Vec<u8>, EncodingError> {
        if self.data.len() > EXTENDED_MAX {
            return Err(EncodingError::DataTooLong(self.data.len()));
        }
        if let Some(Le::Length(len)) = self.le {
            if len == 0 || len > EXTENDED_MAX {
                return Err(EncodingError::LeOutOfRange(len));
            }
        }

        let mut apdu = vec![self.cla, self.ins, self.p1, self.p2];

        if self.uses_extended() {
            // Extended form: a single 00 marker precedes Lc, or Le when no data follows
            apdu.push(0x00);
            if !self.data.is_empty() {
                apdu.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
                apdu.extend_from_slice(&self.data);
            }
            match self.le {
                Some(Le::Length(len)) => apdu.extend_from_slice(&(len as u16).to_be_bytes()),
                Some(Le::Short(0)) => apdu.extend_from_slice(&[0x01, 0x00]),
                Some(Le::Short(le)) => apdu.extend_from_slice(&[0x00, le]),
                None => {}
            }
        } else {
            if !self.data.is_empty() {
                apdu.push(self.data.len() as u8);
                apdu.extend_from_slice(&self.data);
            }
            match self.le {
                Some(Le::Length(len)) => apdu.push(len as u8),
                Some(Le::Short(le)) => apdu.push(le),
                None => {}
            }
        }

        Ok(apdu)
    }

    /// Send this command over the channel
    pub fn send<C>(&self, channel: &mut C) -> Result<ApduResponse, CardError>
    where
        C: SmartCardChannel + ?Sized,
    {
        let apdu_bytes = self.build()?;
        send_apdu(channel, &apdu_bytes)
    }
}

/// Parse raw command bytes back into an [`ApduCommand`]
///
/// Used for APDU templates stored in card profiles. Supports the short
/// forms of cases 1 to 4 and the extended forms of cases 2 to 4.
pub fn parse_apdu(bytes: &[u8]) -> Result<ApduCommand, EncodingError> {
    let invalid = |why: &str| EncodingError::InvalidTemplate(format!("{} ({})", why, hex::encode_upper(bytes)));

    if bytes.len() < 4 {
        return Err(invalid("shorter than a header"));
    }

    let command = ApduCommand::new(bytes[0], bytes[1], bytes[2], bytes[3]);
    let body = &bytes[4..];

    match body.len() {
        // Case 1
        0 => Ok(command),
        // Case 2 short
        1 => Ok(command.le(body[0])),
        _ if body[0] == 0x00 && body.len() >= 3 => {
            let ext = &body[1..];
            let len = ((ext[0] as usize) << 8) | ext[1] as usize;
            if ext.len() == 2 {
                // Case 2 extended, 0000 means 65536 which we do not request
                if len == 0 {
                    return Err(invalid("extended Le of 65536 is not supported"));
                }
                Ok(command.expected_len(len).extended())
            } else if ext.len() == 2 + len && len > 0 {
                Ok(command.data(ext[2..].to_vec()).extended())
            } else if ext.len() == 2 + len + 2 && len > 0 {
                let le = ((ext[2 + len] as usize) << 8) | ext[3 + len] as usize;
                if le == 0 {
                    return Err(invalid("extended Le of 65536 is not supported"));
                }
                Ok(command.data(ext[2..2 + len].to_vec()).expected_len(le).extended())
            } else {
                Err(invalid("inconsistent extended length"))
            }
        }
        _ => {
            let lc = body[0] as usize;
            if lc == 0 {
                return Err(invalid("zero Lc"));
            }
            let data = body.get(1..1 + lc).ok_or_else(|| invalid("Lc exceeds body"))?;
            match body.len() - 1 - lc {
                // Case 3 short
                0 => Ok(command.data(data.to_vec())),
                // Case 4 short
                1 => Ok(command.data(data.to_vec()).le(body[1 + lc])),
                _ => Err(invalid("trailing bytes after Le")),
            }
        }
    }
}

/// eGK and CT-BCS commands used by the read sequence
pub mod commands {
    use super::ApduCommand;

    /// Waiting time byte sent with REQUEST ICC and EJECT ICC
    pub const ICC_TIMER: u8 = 0x05;

    /// RESET CT: `20 11 00 00 00`
    pub fn reset_ct() -> ApduCommand {
        ApduCommand::new(0x20, 0x11, 0x00, 0x00).le(0x00)
    }

    /// REQUEST ICC for slot 1: `20 12 01 00 01 05`
    pub fn request_icc() -> ApduCommand {
        ApduCommand::new(0x20, 0x12, 0x01, 0x00).data(vec![ICC_TIMER])
    }

    /// EJECT ICC for slot 1: `20 15 01 00 01 05`
    pub fn eject_icc() -> ApduCommand {
        ApduCommand::new(0x20, 0x15, 0x01, 0x00).data(vec![ICC_TIMER])
    }

    /// SELECT by application identifier without response data
    pub fn select_aid(aid: &[u8]) -> ApduCommand {
        ApduCommand::new(0x00, 0xA4, 0x04, 0x0C).data(aid.to_vec())
    }

    /// READ BINARY selecting the file by short file identifier, from offset 0
    pub fn read_binary_sfi(sfi: u8, le: u8) -> ApduCommand {
        ApduCommand::new(0x00, 0xB0, 0x80 | (sfi & 0x1F), 0x00).le(le)
    }

    /// READ BINARY of the currently selected file at `offset`
    pub fn read_binary(offset: u16, len: usize) -> ApduCommand {
        let [p1, p2] = (offset & 0x7FFF).to_be_bytes();
        ApduCommand::new(0x00, 0xB0, p1, p2).expected_len(len)
    }

    /// READ RECORD by record number from the file with the given SFI
    pub fn read_record(record_number: u8, sfi: u8) -> ApduCommand {
        let p2 = (sfi << 3) | 0x04;
        ApduCommand::new(0x00, 0xB2, record_number, p2).le(0x00)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(cmd: &ApduCommand) -> Vec<u8> {
        cmd.build().unwrap()
    }

    #[test]
    fn test_case1() {
        assert_eq!(bytes(&ApduCommand::new(0x20, 0x11, 0x00, 0x00)), vec![0x20, 0x11, 0x00, 0x00]);
    }

    #[test]
    fn test_case2_short() {
        let cmd = ApduCommand::new(0x00, 0xB0, 0x81, 0x00).expected_len(2);
        assert_eq!(bytes(&cmd), vec![0x00, 0xB0, 0x81, 0x00, 0x02]);

        let cmd = ApduCommand::new(0x00, 0xB0, 0x9D, 0x00).le(0x00);
        assert_eq!(bytes(&cmd), vec![0x00, 0xB0, 0x9D, 0x00, 0x00]);

        let cmd = ApduCommand::new(0x00, 0xB0, 0x00, 0x02).expected_len(255);
        assert_eq!(bytes(&cmd), vec![0x00, 0xB0, 0x00, 0x02, 0xFF]);
    }

    #[test]
    fn test_case2_extended() {
        let cmd = ApduCommand::new(0x00, 0xB0, 0x00, 0x02).expected_len(0x016F);
        assert_eq!(bytes(&cmd), vec![0x00, 0xB0, 0x00, 0x02, 0x00, 0x01, 0x6F]);

        let cmd = ApduCommand::new(0x00, 0xB0, 0x00, 0x02).expected_len(256);
        assert_eq!(bytes(&cmd), vec![0x00, 0xB0, 0x00, 0x02, 0x00, 0x01, 0x00]);

        let cmd = ApduCommand::new(0x00, 0xB0, 0x00, 0x02).expected_len(0x20).extended();
        assert_eq!(bytes(&cmd), vec![0x00, 0xB0, 0x00, 0x02, 0x00, 0x00, 0x20]);

        let cmd = ApduCommand::new(0x00, 0xB0, 0x00, 0x02).expected_len(EXTENDED_MAX);
        assert_eq!(bytes(&cmd), vec![0x00, 0xB0, 0x00, 0x02, 0x00, 0xFF, 0xFF]);
    }

    #[test]
    fn test_case3_short() {
        let cmd = commands::select_aid(&[0xD2, 0x76, 0x00, 0x00, 0x01, 0x02]);
        assert_eq!(
            bytes(&cmd),
            vec![0x00, 0xA4, 0x04, 0x0C, 0x06, 0xD2, 0x76, 0x00, 0x00, 0x01, 0x02]
        );
    }

    #[test]
    fn test_case3_extended() {
        let data = vec![0xAB; 300];
        let built = bytes(&ApduCommand::new(0x00, 0xD6, 0x00, 0x00).data(data.clone()));
        assert_eq!(&built[..7], &[0x00, 0xD6, 0x00, 0x00, 0x00, 0x01, 0x2C]);
        assert_eq!(&built[7..], &data[..]);
    }

    #[test]
    fn test_case4_short() {
        let cmd = ApduCommand::new(0x00, 0xA4, 0x04, 0x00)
            .data(vec![0xD2, 0x76, 0x00, 0x01, 0x44, 0x80, 0x00])
            .le(0x00);
        assert_eq!(
            bytes(&cmd),
            vec![0x00, 0xA4, 0x04, 0x00, 0x07, 0xD2, 0x76, 0x00, 0x01, 0x44, 0x80, 0x00, 0x00]
        );
    }

    #[test]
    fn test_case4_extended() {
        let cmd = ApduCommand::new(0x00, 0x88, 0x00, 0x00)
            .data(vec![0x01, 0x02])
            .expected_len(300);
        assert_eq!(
            bytes(&cmd),
            vec![0x00, 0x88, 0x00, 0x00, 0x00, 0x00, 0x02, 0x01, 0x02, 0x01, 0x2C]
        );
    }

    #[test]
    fn test_out_of_range_lengths() {
        let cmd = ApduCommand::new(0x00, 0xB0, 0x00, 0x00).expected_len(70_000);
        assert_eq!(cmd.build(), Err(EncodingError::LeOutOfRange(70_000)));

        let cmd = ApduCommand::new(0x00, 0xB0, 0x00, 0x00).expected_len(0);
        assert_eq!(cmd.build(), Err(EncodingError::LeOutOfRange(0)));

        let cmd = ApduCommand::new(0x00, 0xD6, 0x00, 0x00).data(vec![0; 70_000]);
        assert_eq!(cmd.build(), Err(EncodingError::DataTooLong(70_000)));
    }

    #[test]
    fn test_egk_commands() {
        assert_eq!(bytes(&commands::reset_ct()), vec![0x20, 0x11, 0x00, 0x00, 0x00]);
        assert_eq!(bytes(&commands::request_icc()), vec![0x20, 0x12, 0x01, 0x00, 0x01, 0x05]);
        assert_eq!(bytes(&commands::eject_icc()), vec![0x20, 0x15, 0x01, 0x00, 0x01, 0x05]);
        assert_eq!(bytes(&commands::read_binary_sfi(0x1D, 0x00)), vec![0x00, 0xB0, 0x9D, 0x00, 0x00]);
        assert_eq!(bytes(&commands::read_binary_sfi(0x0C, 0x19)), vec![0x00, 0xB0, 0x8C, 0x00, 0x19]);
        assert_eq!(bytes(&commands::read_binary_sfi(0x01, 0x02)), vec![0x00, 0xB0, 0x81, 0x00, 0x02]);
        assert_eq!(bytes(&commands::read_binary_sfi(0x02, 0x08)), vec![0x00, 0xB0, 0x82, 0x00, 0x08]);
        assert_eq!(bytes(&commands::read_record(0x02, 0x10)), vec![0x00, 0xB2, 0x02, 0x84, 0x00]);
    }

    #[test]
    fn test_response_parse() {
        let response = ApduResponse::parse(&[0x01, 0x02, 0x90, 0x00]).unwrap();
        assert_eq!(response.data, vec![0x01, 0x02]);
        assert!(response.is_success());
        assert_eq!(response.status_word(), 0x9000);

        let response = ApduResponse::parse(&[0x6A, 0x82]).unwrap();
        assert!(response.data.is_empty());
        assert_eq!(response.status_string(), "6A82");
    }

    #[test]
    fn test_response_too_short() {
        assert!(matches!(
            ApduResponse::parse(&[0x90]),
            Err(CardError::MalformedResponse { len: 1 })
        ));
        assert!(matches!(
            ApduResponse::parse(&[]),
            Err(CardError::MalformedResponse { len: 0 })
        ));
    }

    #[test]
    fn test_parse_apdu_templates() {
        let root = [0x00, 0xA4, 0x04, 0x0C, 0x07, 0xD2, 0x76, 0x00, 0x01, 0x44, 0x80, 0x00, 0x00];
        let cmd = parse_apdu(&root).unwrap();
        assert_eq!(bytes(&cmd), root.to_vec());

        let case4 = [0x00, 0xA4, 0x04, 0x00, 0x02, 0x3F, 0x00, 0x00];
        assert_eq!(bytes(&parse_apdu(&case4).unwrap()), case4.to_vec());

        let case2e = [0x00, 0xB0, 0x00, 0x02, 0x00, 0x01, 0x6F];
        assert_eq!(bytes(&parse_apdu(&case2e).unwrap()), case2e.to_vec());

        assert_eq!(bytes(&parse_apdu(&[0x20, 0x11, 0x00, 0x00]).unwrap()), vec![0x20, 0x11, 0x00, 0x00]);
    }

    #[test]
    fn test_parse_apdu_rejects_garbage() {
        assert!(parse_apdu(&[0x00, 0xA4]).is_err());
        assert!(parse_apdu(&[0x00, 0xA4, 0x04, 0x0C, 0x07, 0xD2]).is_err());
        assert!(parse_apdu(&[0x00, 0xA4, 0x04, 0x0C, 0x01, 0xD2, 0x00, 0x00]).is_err());
    }
}
