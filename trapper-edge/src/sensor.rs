mod iio;
mod simulated;

pub use iio::IioSensor;
pub use simulated::SimulatedSensor;

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;
use trapper_core::{Measurement, MeasurementBatch};

/// Standard atmosphere at sea level, in hPa.
pub const SEA_LEVEL_PRESSURE_HPA: f64 = 1013.25;

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("sensor device not found at {0}")]
    DeviceNotFound(PathBuf),

    #[error("sensor channel {channel} unavailable: {source}")]
    Channel {
        channel: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("invalid reading on channel {channel}: {raw:?}")]
    InvalidData { channel: &'static str, raw: String },

    #[error("no usable readings in this cycle")]
    NoUsableReadings,
}

/// One sample of the environment sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentReading {
    /// Degrees Celsius.
    pub temperature_c: f64,
    /// Relative humidity, 0-100.
    pub humidity_pct: f64,
    /// Station pressure in hPa.
    pub pressure_hpa: f64,
}

impl EnvironmentReading {
    pub fn altitude_m(&self, reference_hpa: f64) -> f64 {
        altitude_m(self.pressure_hpa, reference_hpa)
    }
}

/// Barometric altitude above the level where pressure equals `reference_hpa`.
pub fn altitude_m(pressure_hpa: f64, reference_hpa: f64) -> f64 {
    44330.0 * (1.0 - (pressure_hpa / reference_hpa).powf(0.1903))
}

/// Item keys used for the four values of a reading.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MetricKeys {
    pub temperature: String,
    pub humidity: String,
    pub pressure: String,
    pub altitude: String,
}

impl Default for MetricKeys {
    fn default() -> Self {
        Self {
            temperature: "env.temperature".to_string(),
            humidity: "env.humidity".to_string(),
            pressure: "env.pressure".to_string(),
            altitude: "env.altitude".to_string(),
        }
    }
}

impl MetricKeys {
    /// Turn a reading into a batch ordered temperature, humidity, pressure,
    /// altitude. Values that are not finite are left out.
    pub fn to_batch(&self, reading: &EnvironmentReading, reference_hpa: f64) -> MeasurementBatch {
        let values = [
            (&self.temperature, reading.temperature_c),
            (&self.humidity, reading.humidity_pct),
            (&self.pressure, reading.pressure_hpa),
            (&self.altitude, reading.altitude_m(reference_hpa)),
        ];

        let mut batch = MeasurementBatch::now();
        batch.extend(values.into_iter().filter_map(|(key, value)| {
            if value.is_finite() {
                Some(Measurement::new(key.as_str(), value))
            } else {
                warn!(key = %key, value, "Dropping unreadable measurement");
                None
            }
        }));

        batch
    }
}

/// Anything that can produce an environment reading on demand.
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    /// Label used in logs.
    fn name(&self) -> &str;

    async fn read(&mut self) -> Result<EnvironmentReading, SensorError>;
}

#[async_trait]
impl<S: MeasurementSource + ?Sized> MeasurementSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn read(&mut self) -> Result<EnvironmentReading, SensorError> {
        (**self).read().await
    }
}
