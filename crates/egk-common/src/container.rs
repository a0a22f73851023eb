//! GZIP container recovery
//!
//! EF.PD and EF.VD hold a gzip stream that may be preceded by framing bytes
//! which are not part of the stream. The decompressed XML is ISO-8859-15
//! encoded as mandated for the card, unless its prolog declares UTF-8.

use std::io::{self, Read};

use encoding_rs::{ISO_8859_15, UTF_8};
use flate2::bufread::GzDecoder;
use thiserror::Error;
use tracing::debug;

/// Magic, compression method (deflate) and flag byte of a card gzip stream
pub const GZIP_PREFIX: [u8; 4] = [0x1F, 0x8B, 0x08, 0x00];

/// Errors that can occur while recovering a container
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("container is empty")]
    Empty,

    #[error("gzip decompression failed: {0}")]
    Decompression(#[source] io::Error),
}

/// Offset of the gzip stream inside a raw container
///
/// Returns 0 when no gzip prefix is found, so the whole buffer is treated as
/// the candidate stream.
pub fn locate_gzip(raw: &[u8]) -> usize {
    raw.windows(GZIP_PREFIX.len())
        .position(|window| window == GZIP_PREFIX)
        .unwrap_or(0)
}

/// Inflate a gzip stream
///
/// The stream must consume the input. Only NUL padding may follow the gzip
/// trailer. Fails on a corrupt stream, a premature end, a checksum
/// mismatch, a compression method other than deflate or trailing data.
pub fn inflate(stream: &[u8]) -> Result<Vec<u8>, ContainerError> {
    if stream.is_empty() {
        return Err(ContainerError::Empty);
    }

    let mut decoder = GzDecoder::new(stream);
    let mut plain = Vec::new();
    decoder
        .read_to_end(&mut plain)
        .map_err(ContainerError::Decompression)?;

    let rest = decoder.into_inner();
    if rest.iter().any(|&b| b != 0x00) {
        return Err(ContainerError::Decompression(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} bytes of trailing data after gzip stream", rest.len()),
        )));
    }
    if !rest.is_empty() {
        debug!(padding = rest.len(), "NUL padding after gzip stream");
    }

    Ok(plain)
}

/// Whether an XML prolog at the start of `bytes` declares UTF-8
fn declares_utf8(bytes: &[u8]) -> bool {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let head = &bytes[start..];
    if !head.starts_with(b"<?xml") {
        return false;
    }
    let end = head.windows(2).position(|w| w == b"?>").unwrap_or(head.len());
    let prolog = head[..end].to_ascii_lowercase();
    prolog.windows(5).any(|w| w == b"utf-8")
}

/// Decode container bytes as text
///
/// ISO-8859-15 is the card encoding. A prolog declaring UTF-8 selects UTF-8,
/// falling back to ISO-8859-15 when the bytes are not valid UTF-8. The text
/// is cut at the first NUL character and trimmed.
pub fn decode_text(bytes: &[u8]) -> String {
    let utf8 = if declares_utf8(bytes) {
        UTF_8.decode_without_bom_handling_and_without_replacement(bytes)
    } else {
        None
    };
    let text = match utf8 {
        Some(text) => text,
        None => ISO_8859_15.decode_without_bom_handling(bytes).0,
    };

    let text = match text.find('\0') {
        Some(nul) => &text[..nul],
        None => &text[..],
    };

    text.trim().to_string()
}

/// Recover the XML text of a raw container (status word already stripped)
pub fn recover(raw: &[u8]) -> Result<String, ContainerError> {
    if raw.is_empty() {
        return Err(ContainerError::Empty);
    }

    let offset = locate_gzip(raw);
    debug!(offset, len = raw.len(), "gzip stream located");

    let plain = inflate(&raw[offset..])?;
    debug!(inflated = plain.len(), "container inflated");

    Ok(decode_text(&plain))
}
