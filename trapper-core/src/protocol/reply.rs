use std::str::FromStr;

use serde::Deserialize;

use super::{MAGIC, Frame, error::ProtocolResult};

/// Reply body a server sends after processing `sender data`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerReply {
    pub response: String,
    #[serde(default)]
    pub info: Option<String>,
}

impl ServerReply {
    /// Parse a reply that is either a framed message or bare JSON.
    pub fn parse(raw: &[u8]) -> ProtocolResult<Self> {
        if raw.starts_with(&MAGIC) {
            let frame = Frame::from_bytes(raw)?;
            return Ok(serde_json::from_slice(frame.payload())?);
        }

        Ok(serde_json::from_slice(raw)?)
    }

    pub fn is_success(&self) -> bool {
        self.response == "success"
    }

    /// Counters from the `info` string, when the server sent them.
    pub fn processed(&self) -> Option<ProcessedInfo> {
        self.info.as_deref()?.parse().ok()
    }
}

/// Item counters reported by the server, e.g.
/// `processed: 3; failed: 1; total: 4; seconds spent: 0.000055`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessedInfo {
    pub processed: u64,
    pub failed: u64,
    pub total: u64,
    pub seconds_spent: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidInfo;

impl FromStr for ProcessedInfo {
    type Err = InvalidInfo;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut processed = None;
        let mut failed = None;
        let mut total = None;
        let mut seconds_spent = None;

        for part in s.split(';') {
            let Some((name, value)) = part.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match name.trim() {
                "processed" => processed = value.parse().ok(),
                "failed" => failed = value.parse().ok(),
                "total" => total = value.parse().ok(),
                "seconds spent" => seconds_spent = value.parse().ok(),
                _ => {}
            }
        }

        Ok(Self {
            processed: processed.ok_or(InvalidInfo)?,
            failed: failed.ok_or(InvalidInfo)?,
            total: total.ok_or(InvalidInfo)?,
            seconds_spent: seconds_spent.unwrap_or_default(),
        })
    }
}
