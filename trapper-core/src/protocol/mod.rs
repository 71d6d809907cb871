mod error;
mod frame;
mod payload;
mod reply;

pub use error::{ProtocolError, ProtocolResult};
pub use frame::{Frame, LengthLimit, decode_length, encode_length};
pub use payload::{SenderData, render_value};
pub use reply::{InvalidInfo, ProcessedInfo, ServerReply};

// frame structure : magic(4) + flag(1) + length(8) + payload

pub const MAGIC: [u8; 4] = *b"ZBXD";
pub const PROTOCOL_FLAG: u8 = 0x01;
pub const PREAMBLE_SIZE: usize = 5;
pub const LENGTH_FIELD_SIZE: usize = 8;
pub const HEADER_SIZE: usize = PREAMBLE_SIZE + LENGTH_FIELD_SIZE;
pub const LEGACY_MAX_PAYLOAD: usize = u16::MAX as usize;
pub const DEFAULT_PORT: u16 = 10051;
