pub mod protocol;

pub use protocol::{Frame, LengthLimit, ProcessedInfo, ProtocolError, SenderData, ServerReply};

// Monitoring keys never change after capture, so they are stored as
// `Box<str>` to keep each measurement compact.
type BoxStr = Box<str>;

/// A single value captured for one monitoring item.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Item key the server files this value under.
    pub key: BoxStr,
    /// Measured value.
    pub value: f64,
}

impl Measurement {
    pub fn new(key: impl Into<BoxStr>, value: f64) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Measurements captured together in one send cycle.
///
/// Order is significant: the payload lists items exactly in the order they
/// were pushed.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementBatch {
    captured_at: jiff::Timestamp,
    measurements: Vec<Measurement>,
}

impl MeasurementBatch {
    pub fn new(captured_at: jiff::Timestamp) -> Self {
        Self {
            captured_at,
            measurements: Vec::with_capacity(4),
        }
    }

    /// Start a batch stamped with the current time.
    pub fn now() -> Self {
        Self::new(jiff::Timestamp::now())
    }

    pub fn push(&mut self, measurement: Measurement) {
        self.measurements.push(measurement);
    }

    pub fn with(mut self, key: impl Into<BoxStr>, value: f64) -> Self {
        self.push(Measurement::new(key, value));
        self
    }

    pub fn captured_at(&self) -> jiff::Timestamp {
        self.captured_at
    }

    pub fn iter(&self) -> impl Iterator<Item = &Measurement> {
        self.measurements.iter()
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }
}

impl Extend<Measurement> for MeasurementBatch {
    fn extend<I: IntoIterator<Item = Measurement>>(&mut self, iter: I) {
        self.measurements.extend(iter);
    }
}
