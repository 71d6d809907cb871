use serde::Deserialize;

use super::{
    HEADER_SIZE, LEGACY_MAX_PAYLOAD, LENGTH_FIELD_SIZE, MAGIC, PREAMBLE_SIZE, PROTOCOL_FLAG,
    error::{ProtocolError, ProtocolResult},
};

/// How many bytes the 8-byte length field is allowed to describe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthLimit {
    /// Only the low two bytes carry the length, capping payloads at 65535
    /// bytes. Matches consumers built for the original embedded senders.
    #[default]
    Legacy,
    /// Full 64-bit little-endian length. Only for peers known to accept it.
    Extended,
}

impl LengthLimit {
    pub fn max_payload(self) -> usize {
        match self {
            LengthLimit::Legacy => LEGACY_MAX_PAYLOAD,
            LengthLimit::Extended => usize::MAX,
        }
    }
}

/// Encode a payload length into the frame's length field.
pub fn encode_length(len: usize, limit: LengthLimit) -> ProtocolResult<[u8; LENGTH_FIELD_SIZE]> {
    let max = limit.max_payload();
    if len > max {
        return Err(ProtocolError::OversizedPayload { size: len, max });
    }

    let mut bytes = [0u8; LENGTH_FIELD_SIZE];

    match limit {
        LengthLimit::Legacy => {
            let len_le: [u8; 2] = (len as u16).to_le_bytes();
            bytes[0] = len_le[0];
            bytes[1] = len_le[1];
        }
        LengthLimit::Extended => {
            bytes = (len as u64).to_le_bytes();
        }
    }

    Ok(bytes)
}

pub fn decode_length(field: &[u8; LENGTH_FIELD_SIZE]) -> u64 {
    u64::from_le_bytes(*field)
}

/// A complete trapper message: preamble, length field and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    length: [u8; LENGTH_FIELD_SIZE],
    payload: Vec<u8>,
}

impl Frame {
    pub fn new(payload: impl Into<Vec<u8>>, limit: LengthLimit) -> ProtocolResult<Self> {
        let payload = payload.into();
        let length = encode_length(payload.len(), limit)?;

        Ok(Self { length, payload })
    }

    pub fn preamble(&self) -> [u8; PREAMBLE_SIZE] {
        [MAGIC[0], MAGIC[1], MAGIC[2], MAGIC[3], PROTOCOL_FLAG]
    }

    pub fn length_field(&self) -> &[u8; LENGTH_FIELD_SIZE] {
        &self.length
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Size of the whole frame on the wire.
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Parse one frame from the start of `bytes`. Trailing bytes are ignored.
    pub fn from_bytes(bytes: &[u8]) -> ProtocolResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::InsufficientData {
                needed: HEADER_SIZE,
                available: bytes.len(),
            });
        }

        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != MAGIC {
            return Err(ProtocolError::InvalidMagic(magic));
        }

        if bytes[4] != PROTOCOL_FLAG {
            return Err(ProtocolError::UnsupportedFlag(bytes[4]));
        }

        let mut length = [0u8; LENGTH_FIELD_SIZE];
        length.copy_from_slice(&bytes[PREAMBLE_SIZE..HEADER_SIZE]);

        // a length that does not fit in memory can never be satisfied
        let total_len = usize::try_from(decode_length(&length))
            .ok()
            .and_then(|len| len.checked_add(HEADER_SIZE))
            .unwrap_or(usize::MAX);

        if bytes.len() < total_len {
            return Err(ProtocolError::InsufficientData {
                needed: total_len,
                available: bytes.len(),
            });
        }

        Ok(Self {
            length,
            payload: bytes[HEADER_SIZE..total_len].to_vec(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.wire_len());

        bytes.extend_from_slice(&self.preamble());
        bytes.extend_from_slice(&self.length);
        bytes.extend_from_slice(&self.payload);

        bytes
    }
}
