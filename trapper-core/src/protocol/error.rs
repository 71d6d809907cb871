pub type ProtocolResult<T> = core::result::Result<T, ProtocolError>;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("payload of {size} bytes exceeds the {max} byte frame limit")]
    OversizedPayload { size: usize, max: usize },

    #[error("invalid frame magic: {0:02X?}")]
    InvalidMagic([u8; 4]),

    #[error("unsupported protocol flag: {0:#04X}")]
    UnsupportedFlag(u8),

    #[error("insufficient data: needed {needed} bytes, {available} available")]
    InsufficientData { needed: usize, available: usize },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
