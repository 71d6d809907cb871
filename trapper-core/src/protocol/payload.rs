use serde::Serialize;

use super::error::ProtocolResult;
use crate::MeasurementBatch;

const SENDER_DATA_REQUEST: &str = "sender data";

/// The `sender data` request body pushed to the server.
#[derive(Debug, Serialize)]
pub struct SenderData<'a> {
    request: &'static str,
    data: Vec<SenderItem<'a>>,
}

#[derive(Debug, Serialize)]
struct SenderItem<'a> {
    host: &'a str,
    key: &'a str,
    /// The server expects values as strings regardless of item type.
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    clock: Option<i64>,
}

impl<'a> SenderData<'a> {
    pub fn new(host: &'a str, batch: &'a MeasurementBatch) -> Self {
        let data = batch
            .iter()
            .map(|m| SenderItem {
                host,
                key: &m.key,
                value: render_value(m.value),
                clock: None,
            })
            .collect();

        Self {
            request: SENDER_DATA_REQUEST,
            data,
        }
    }

    /// Stamp every item with the batch capture time in unix seconds.
    pub fn with_clock(mut self, batch: &MeasurementBatch) -> Self {
        let clock = batch.captured_at().as_second();
        for item in &mut self.data {
            item.clock = Some(clock);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn to_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Shortest decimal text that reads back as the same value.
pub fn render_value(value: f64) -> String {
    value.to_string()
}
