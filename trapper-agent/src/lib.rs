pub mod config;

pub use config::{AgentConfig, Config, MeasurementConfig, SensorConfig, ServerConfig};
