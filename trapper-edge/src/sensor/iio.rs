use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use super::{EnvironmentReading, MeasurementSource, SensorError};

const TEMP_CHANNEL: &str = "in_temp_input";
const HUMIDITY_CHANNEL: &str = "in_humidityrelative_input";
const PRESSURE_CHANNEL: &str = "in_pressure_input";

const CHANNELS: [&str; 3] = [TEMP_CHANNEL, HUMIDITY_CHANNEL, PRESSURE_CHANNEL];

/// Combined temperature/humidity/pressure sensor exposed through the Linux
/// industrial I/O sysfs interface, e.g. `/sys/bus/iio/devices/iio:device0`.
///
/// Channel units follow the IIO ABI: milli-degrees Celsius, milli-percent
/// relative humidity and kilopascal.
#[derive(Debug)]
pub struct IioSensor {
    device: PathBuf,
    name: String,
}

impl IioSensor {
    /// Open the device directory and check every channel is present.
    pub async fn open(device: impl Into<PathBuf>) -> Result<Self, SensorError> {
        let device = device.into();

        if !fs::metadata(&device).await.is_ok_and(|m| m.is_dir()) {
            return Err(SensorError::DeviceNotFound(device));
        }

        for channel in CHANNELS {
            fs::metadata(device.join(channel))
                .await
                .map_err(|source| SensorError::Channel { channel, source })?;
        }

        let name = match fs::read_to_string(device.join("name")).await {
            Ok(name) => name.trim().to_owned(),
            Err(_) => device.display().to_string(),
        };

        info!(device = %device.display(), %name, "IIO sensor ready");

        Ok(Self { device, name })
    }

    async fn read_channel(&self, channel: &'static str) -> Result<f64, SensorError> {
        let raw = fs::read_to_string(self.device.join(channel))
            .await
            .map_err(|source| SensorError::Channel { channel, source })?;
        let raw = raw.trim();

        raw.parse().map_err(|_| SensorError::InvalidData {
            channel,
            raw: raw.to_owned(),
        })
    }
}

#[async_trait]
impl MeasurementSource for IioSensor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read(&mut self) -> Result<EnvironmentReading, SensorError> {
        let reading = EnvironmentReading {
            temperature_c: self.read_channel(TEMP_CHANNEL).await? / 1000.0,
            humidity_pct: self.read_channel(HUMIDITY_CHANNEL).await? / 1000.0,
            pressure_hpa: self.read_channel(PRESSURE_CHANNEL).await? * 10.0,
        };

        debug!(?reading, "IIO sample");
        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_device(temp: &str, humidity: &str, pressure: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("name"), "bme280\n").unwrap();
        std::fs::write(dir.path().join(TEMP_CHANNEL), temp).unwrap();
        std::fs::write(dir.path().join(HUMIDITY_CHANNEL), humidity).unwrap();
        std::fs::write(dir.path().join(PRESSURE_CHANNEL), pressure).unwrap();
        dir
    }

    #[tokio::test]
    async fn reads_and_scales_channels() {
        let dir = fake_device("23500\n", "41250\n", "101.325\n");
        let mut sensor = IioSensor::open(dir.path()).await.unwrap();

        assert_eq!(sensor.name(), "bme280");

        let reading = sensor.read().await.unwrap();
        assert_eq!(reading.temperature_c, 23.5);
        assert_eq!(reading.humidity_pct, 41.25);
        assert!((reading.pressure_hpa - 1013.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn missing_device_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("iio:device9");

        assert!(matches!(
            IioSensor::open(&missing).await,
            Err(SensorError::DeviceNotFound(path)) if path == missing
        ));
    }

    #[tokio::test]
    async fn missing_channel_is_fatal() {
        let dir = fake_device("1", "1", "1");
        std::fs::remove_file(dir.path().join(HUMIDITY_CHANNEL)).unwrap();

        assert!(matches!(
            IioSensor::open(dir.path()).await,
            Err(SensorError::Channel {
                channel: HUMIDITY_CHANNEL,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn garbage_value_is_reported() {
        let dir = fake_device("23500", "oops", "100");
        let mut sensor = IioSensor::open(dir.path()).await.unwrap();

        assert!(matches!(
            sensor.read().await,
            Err(SensorError::InvalidData { channel: HUMIDITY_CHANNEL, raw }) if raw == "oops"
        ));
    }
}
