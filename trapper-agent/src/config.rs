use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::eyre::{WrapErr, bail};
use serde::Deserialize;
use trapper_core::{LengthLimit, protocol::DEFAULT_PORT};
use trapper_edge::{MetricKeys, SenderConfig, sensor::SEA_LEVEL_PRESSURE_HPA};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub agent: AgentConfig,
    pub measurement: MeasurementConfig,
    pub sensor: SensorConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host name or IP address of the trapper server
    pub address: String,
    pub port: u16,
    /// Seconds to wait for the TCP connection to open
    pub connect_timeout_secs: u64,
    /// Seconds to wait for the server's reply
    pub response_timeout_secs: u64,
    /// `legacy` caps payloads at 65535 bytes, `extended` lifts the cap
    pub length_limit: LengthLimit,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Host name the items belong to on the server
    pub host: String,
    /// Seconds between send cycles
    pub interval_secs: u64,
    /// Attach the capture timestamp to each item
    pub include_clock: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    /// Pressure in hPa that corresponds to zero altitude
    pub reference_pressure_hpa: f64,
    pub keys: MetricKeys,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SensorConfig {
    Simulated {
        /// Fixed seed for a reproducible sequence
        seed: Option<u64>,
    },
    Iio {
        /// sysfs device directory, e.g. /sys/bus/iio/devices/iio:device0
        path: PathBuf,
    },
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config
            .validate()
            .wrap_err_with(|| format!("invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> color_eyre::Result<()> {
        if self.agent.interval_secs == 0 {
            bail!("agent.interval_secs must be at least 1");
        }
        Ok(())
    }

    pub fn sender(&self) -> SenderConfig {
        SenderConfig {
            server: self.server.address.clone(),
            port: self.server.port,
            host: self.agent.host.clone(),
            connect_timeout: Duration::from_secs(self.server.connect_timeout_secs),
            response_timeout: Duration::from_secs(self.server.response_timeout_secs),
            length_limit: self.server.length_limit,
            include_clock: self.agent.include_clock,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.agent.interval_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            connect_timeout_secs: 5,
            response_timeout_secs: 10,
            length_limit: LengthLimit::Legacy,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host: "weather-station".to_string(),
            interval_secs: 60,
            include_clock: false,
        }
    }
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            reference_pressure_hpa: SEA_LEVEL_PRESSURE_HPA,
            keys: MetricKeys::default(),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig::Simulated { seed: None }
    }
}
