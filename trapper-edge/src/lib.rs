pub mod engine;
pub mod sender;
pub mod sensor;

pub use engine::{CycleOutcome, CycleStats, Engine, MIN_INTERVAL};
pub use sender::{
    Acknowledgment, MAX_REPLY_SIZE, SendError, SenderConfig, Stage, TrapperSender,
};
pub use sensor::{
    EnvironmentReading, IioSensor, MeasurementSource, MetricKeys, SensorError, SimulatedSensor,
};

pub use trapper_core::{LengthLimit, Measurement, MeasurementBatch};
