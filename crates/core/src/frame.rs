//! Binary frame header and body decoding for the socket protocol (C1).
//!
//! The transport layer (`crates/server/src/transport.rs`) is responsible
//! for pulling discrete WebSocket messages off the wire; everything here
//! is a pure, synchronous decode over bytes already in memory so it can
//! be unit-tested without a socket.

use crate::error::{Error, Result};

const PREFIX: u8 = 0x03;
const RESERVED: u8 = 0x00;
const ESTIMATION_HEADER: u8 = 0x80;
pub const HEADER_LEN: usize = 8;
pub const VALUE_STATE_LEN: usize = 24;
pub const KEEPALIVE_MESSAGE: &str = "keepalive";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identifier {
    Text,
    File,
    ValueStates,
    TextStates,
    DaytimeStates,
    OutOfService,
    KeepAlive,
    WeatherStates,
}

impl TryFrom<u8> for Identifier {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Identifier::Text),
            1 => Ok(Identifier::File),
            2 => Ok(Identifier::ValueStates),
            3 => Ok(Identifier::TextStates),
            4 => Ok(Identifier::DaytimeStates),
            5 => Ok(Identifier::OutOfService),
            6 => Ok(Identifier::KeepAlive),
            7 => Ok(Identifier::WeatherStates),
            other => Err(Error::UnknownIdentifier(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub identifier: Identifier,
    pub size: u32,
}

/// The outcome of decoding one 8-byte header message.
///
/// An estimation header (`info == 0x80`) announces the size of the *next*
/// real header and is never surfaced to callers — they should read another
/// message and parse it as a header again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedHeader {
    Header(Header),
    Estimation,
}

/// Decode one 8-byte header message.
///
/// `<prefix:u8=0x03> <identifier:u8> <info:u8> <reserved:u8=0x00> <size:u32 LE>`
pub fn parse_header(message: &[u8]) -> Result<ParsedHeader> {
    if message.len() != HEADER_LEN {
        return Err(Error::Protocol(format!(
            "header message must be {HEADER_LEN} bytes, got {}",
            message.len()
        )));
    }

    let prefix = message[0];
    if prefix != PREFIX {
        return Err(Error::Protocol(format!(
            "expected prefix byte {PREFIX:#04x}, got {prefix:#04x}"
        )));
    }

    let info = message[2];
    let reserved = message[3];
    if info == ESTIMATION_HEADER {
        return Ok(ParsedHeader::Estimation);
    }
    if reserved != RESERVED {
        return Err(Error::Protocol(format!(
            "reserved byte must be 0x00, got {reserved:#04x}"
        )));
    }

    let identifier = Identifier::try_from(message[1])?;
    let size = u32::from_le_bytes([message[4], message[5], message[6], message[7]]);

    Ok(ParsedHeader::Header(Header { identifier, size }))
}

/// Decode a UTF-8 text body (also used for JSON bodies prior to `serde_json::from_str`).
pub fn decode_text(body: &[u8]) -> Result<&str> {
    Ok(std::str::from_utf8(body)?)
}

/// Render a value-state UUID the way the Miniserver does: the last group is
/// 16 hex characters, not the RFC-4122 8+12 split.
fn render_identifier(time_low: u32, time_mid: u16, time_hi: u16, node: &[u8; 8]) -> String {
    format!(
        "{time_low:08x}-{time_mid:04x}-{time_hi:04x}-{}",
        node.iter().map(|b| format!("{b:02x}")).collect::<String>()
    )
}

/// Decode a VALUE_STATES body into `(identifier, value)` pairs. Each record
/// is 24 bytes: a 16-byte UUID-shaped identifier followed by an f64.
pub fn decode_value_states(body: &[u8]) -> Result<Vec<(String, f64)>> {
    if body.len() % VALUE_STATE_LEN != 0 {
        return Err(Error::MisalignedValueStates(body.len()));
    }

    let mut out = Vec::with_capacity(body.len() / VALUE_STATE_LEN);
    for chunk in body.chunks_exact(VALUE_STATE_LEN) {
        let time_low = u32::from_le_bytes(chunk[0..4].try_into().unwrap());
        let time_mid = u16::from_le_bytes(chunk[4..6].try_into().unwrap());
        let time_hi = u16::from_le_bytes(chunk[6..8].try_into().unwrap());
        let node: [u8; 8] = chunk[8..16].try_into().unwrap();
        let value = f64::from_le_bytes(chunk[16..24].try_into().unwrap());
        out.push((render_identifier(time_low, time_mid, time_hi, &node), value));
    }
    Ok(out)
}
