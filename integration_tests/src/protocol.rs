//! Console protocol definitions matching the firmware.

#![allow(dead_code)]

use crc::{Crc, CRC_16_XMODEM};

/// Protocol version (must match firmware)
pub const PROTOCOL_VERSION: u8 = 1;

/// Encoded configuration record length
pub const RECORD_LEN: usize = 52;

/// Leading bytes of an encoded configuration record
pub const RECORD_MAGIC: &[u8; 4] = b"FOIL";

/// Serialised battery curve length, 101 u16 LE points
pub const CURVE_BYTES: usize = 202;

/// Largest battery curve chunk per frame
pub const MAX_CURVE_CHUNK: usize = 64;

/// RelayStatus payload length
pub const RELAY_STATUS_LEN: usize = 20;

/// OutputStatus payload length
pub const OUTPUT_STATUS_LEN: usize = 14;

/// Command IDs matching the firmware protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandId {
    GetVersion = 0x01,
    Reboot = 0x03,
    GetAll = 0x20,
    GetKey = 0x21,
    SetKey = 0x22,
    SetBatch = 0x23,
    Save = 0x24,
    ResetDefaults = 0x25,
    GetCurveChunk = 0x26,
    SetCurveChunk = 0x27,
    SaveCurve = 0x28,
    GetLinkStatus = 0x30,
    StartPairing = 0x31,
    Unpair = 0x32,
    ClearLinkStats = 0x33,
    GetRelayStatus = 0x40,
    GetOutputStatus = 0x41,
}

/// Configuration keys used by the tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConfigKey {
    RfPowerDbm = 2,
    Trim = 6,
    FoilNumCells = 12,
}

/// Response status codes matching the firmware protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseStatus {
    Success = 0x00,
    InvalidCommand = 0x01,
    InvalidLength = 0x02,
    CrcError = 0x03,
    InvalidVersion = 0x04,
    InvalidKey = 0x10,
    InvalidValue = 0x11,
    StorageError = 0x12,
}

impl TryFrom<u8> for ResponseStatus {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ResponseStatus::Success),
            0x01 => Ok(ResponseStatus::InvalidCommand),
            0x02 => Ok(ResponseStatus::InvalidLength),
            0x03 => Ok(ResponseStatus::CrcError),
            0x04 => Ok(ResponseStatus::InvalidVersion),
            0x10 => Ok(ResponseStatus::InvalidKey),
            0x11 => Ok(ResponseStatus::InvalidValue),
            0x12 => Ok(ResponseStatus::StorageError),
            _ => Err(value),
        }
    }
}

const CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Build a command frame (without COBS encoding).
/// Format: [version: u8][cmd_id: u8][length: u16 LE][payload][crc16: u16 LE]
pub fn build_command_payload(cmd_id: u8, payload: &[u8]) -> Vec<u8> {
    let length = payload.len() as u16;
    let mut data = Vec::with_capacity(6 + payload.len());

    data.push(PROTOCOL_VERSION);
    data.push(cmd_id);
    data.extend_from_slice(&length.to_le_bytes());
    data.extend_from_slice(payload);

    let checksum = CRC.checksum(&data);
    data.extend_from_slice(&checksum.to_le_bytes());

    data
}

/// COBS encode (corncobs includes zero delimiter).
pub fn cobs_encode(data: &[u8]) -> Vec<u8> {
    let mut encoded = vec![0u8; corncobs::max_encoded_len(data.len())];
    let len = corncobs::encode_buf(data, &mut encoded);
    encoded.truncate(len);
    encoded
}

/// Build a complete COBS-encoded command frame.
pub fn build_command(cmd_id: CommandId, payload: &[u8]) -> Vec<u8> {
    let raw = build_command_payload(cmd_id as u8, payload);
    cobs_encode(&raw)
}

/// Key id followed by a 4-byte little-endian value
pub fn key_value(key: ConfigKey, value: i32) -> [u8; 5] {
    let mut item = [0u8; 5];
    item[0] = key as u8;
    item[1..].copy_from_slice(&value.to_le_bytes());
    item
}

/// Response IDs matching the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseId {
    Version = 0x01,
    Record = 0x20,
    Value = 0x21,
    CurveChunk = 0x26,
    LinkStatus = 0x30,
    RelayStatus = 0x40,
    OutputStatus = 0x41,
    Ack = 0x80,
    Error = 0xFF,
}

impl TryFrom<u8> for ResponseId {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            0x01 => Ok(ResponseId::Version),
            0x20 => Ok(ResponseId::Record),
            0x21 => Ok(ResponseId::Value),
            0x26 => Ok(ResponseId::CurveChunk),
            0x30 => Ok(ResponseId::LinkStatus),
            0x40 => Ok(ResponseId::RelayStatus),
            0x41 => Ok(ResponseId::OutputStatus),
            0x80 => Ok(ResponseId::Ack),
            0xFF => Ok(ResponseId::Error),
            _ => Err(value),
        }
    }
}

/// Parsed response from the device.
#[derive(Debug)]
pub struct Response {
    pub version: u8,
    pub resp_id: ResponseId,
    pub payload: Vec<u8>,
}

impl Response {
    /// Status and original command id of an Error response
    pub fn error(&self) -> Option<(Result<ResponseStatus, u8>, u8)> {
        match (self.resp_id, self.payload.as_slice()) {
            (ResponseId::Error, [status, cmd_id]) => {
                Some((ResponseStatus::try_from(*status), *cmd_id))
            }
            _ => None,
        }
    }

    /// Curve bytes carried by a CurveChunk response at `offset`
    pub fn curve_chunk(&self, offset: u16) -> Option<&[u8]> {
        match (self.resp_id, self.payload.as_slice()) {
            (ResponseId::CurveChunk, [lo, hi, bytes @ ..])
                if u16::from_le_bytes([*lo, *hi]) == offset =>
            {
                Some(bytes)
            }
            _ => None,
        }
    }

    /// Value carried by a Value response, as a signed integer
    pub fn value_i32(&self) -> Option<i32> {
        match (self.resp_id, self.payload.as_slice()) {
            (ResponseId::Value, [_, a, b, c, d]) => Some(i32::from_le_bytes([*a, *b, *c, *d])),
            _ => None,
        }
    }
}

/// Parse a COBS-decoded response.
/// Format: [version: u8][resp_id: u8][length: u16 LE][payload][crc: u16 LE]
pub fn parse_response(data: &[u8]) -> anyhow::Result<Response> {
    if data.len() < 6 {
        anyhow::bail!("Response too short: {} bytes", data.len());
    }

    let version = data[0];
    let resp_id_byte = data[1];
    let length = u16::from_le_bytes([data[2], data[3]]) as usize;

    if data.len() < 4 + length + 2 {
        anyhow::bail!(
            "Response payload incomplete: expected {}, got {}",
            4 + length + 2,
            data.len()
        );
    }

    let payload = data[4..4 + length].to_vec();
    let received_crc = u16::from_le_bytes([data[4 + length], data[4 + length + 1]]);

    let calculated_crc = CRC.checksum(&data[..4 + length]);
    if calculated_crc != received_crc {
        anyhow::bail!(
            "CRC mismatch: expected {:04x}, got {:04x}",
            calculated_crc,
            received_crc
        );
    }

    if version != PROTOCOL_VERSION {
        anyhow::bail!(
            "Protocol version mismatch: expected {}, got {}",
            PROTOCOL_VERSION,
            version
        );
    }

    let resp_id = ResponseId::try_from(resp_id_byte)
        .map_err(|v| anyhow::anyhow!("Unknown response ID: {:#04x}", v))?;

    Ok(Response {
        version,
        resp_id,
        payload,
    })
}

/// COBS decode a frame (including the zero delimiter).
pub fn cobs_decode(data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut decoded = vec![0u8; data.len()];
    let len = corncobs::decode_buf(data, &mut decoded)
        .map_err(|e| anyhow::anyhow!("COBS decode error: {:?}", e))?;
    decoded.truncate(len);
    Ok(decoded)
}
