use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::sender::{Acknowledgment, SendError, TrapperSender};
use crate::sensor::{MeasurementSource, MetricKeys, SEA_LEVEL_PRESSURE_HPA, SensorError};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
/// Shortest cycle period; `tokio::time::interval` rejects a zero period.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Result of one read-and-send cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    Sent(Acknowledgment),
    Failed(SendError),
    /// Nothing was sent because the sensor gave no usable values.
    Skipped(SensorError),
}

impl CycleOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, CycleOutcome::Sent(_))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub sent: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl CycleStats {
    fn record(&mut self, outcome: &CycleOutcome) {
        match outcome {
            CycleOutcome::Sent(_) => self.sent += 1,
            CycleOutcome::Failed(_) => self.failed += 1,
            CycleOutcome::Skipped(_) => self.skipped += 1,
        }
    }
}

/// Drives the periodic cycle: read the sensor, send one batch, repeat.
///
/// The engine owns both the source and the sender, so cycles never overlap.
pub struct Engine<S: MeasurementSource> {
    source: S,
    sender: TrapperSender,
    keys: MetricKeys,
    reference_hpa: f64,
    interval: Duration,
    stats: CycleStats,
}

impl<S: MeasurementSource> Engine<S> {
    pub fn new(source: S, sender: TrapperSender) -> Self {
        Self {
            source,
            sender,
            keys: MetricKeys::default(),
            reference_hpa: SEA_LEVEL_PRESSURE_HPA,
            interval: DEFAULT_INTERVAL,
            stats: CycleStats::default(),
        }
    }

    pub fn with_keys(mut self, keys: MetricKeys) -> Self {
        self.keys = keys;
        self
    }

    /// Pressure, in hPa, that corresponds to zero altitude.
    pub fn with_reference_pressure(mut self, reference_hpa: f64) -> Self {
        self.reference_hpa = reference_hpa;
        self
    }

    /// Time between cycles, raised to [`MIN_INTERVAL`] if shorter.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if interval < MIN_INTERVAL {
            warn!(?interval, min = ?MIN_INTERVAL, "Interval too short, using minimum");
        }
        self.interval = interval.max(MIN_INTERVAL);
        self
    }

    pub fn stats(&self) -> CycleStats {
        self.stats
    }

    pub async fn run_once(&mut self) -> CycleOutcome {
        let outcome = self.cycle().await;
        self.stats.record(&outcome);
        outcome
    }

    async fn cycle(&mut self) -> CycleOutcome {
        let reading = match self.source.read().await {
            Ok(reading) => reading,
            Err(e) => {
                error!(sensor = self.source.name(), error = %e, "Sensor read failed");
                return CycleOutcome::Skipped(e);
            }
        };

        let batch = self.keys.to_batch(&reading, self.reference_hpa);
        if batch.is_empty() {
            warn!(sensor = self.source.name(), "Skipping cycle with no usable readings");
            return CycleOutcome::Skipped(SensorError::NoUsableReadings);
        }

        match self.sender.send(&batch).await {
            Ok(ack) => CycleOutcome::Sent(ack),
            Err(e) => CycleOutcome::Failed(e),
        }
    }

    /// Run cycles on a fixed interval until `cancel` fires.
    ///
    /// The first cycle starts immediately. A cycle that overruns the interval
    /// delays the next tick instead of triggering a burst.
    pub async fn run(mut self, cancel: CancellationToken) -> CycleStats {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            sensor = self.source.name(),
            addr = %self.sender.addr(),
            interval_secs = self.interval.as_secs_f64(),
            "Engine started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = interval.tick() => {
                    self.run_once().await;
                }
            }
        }

        info!(
            sent = self.stats.sent,
            failed = self.stats.failed,
            skipped = self.stats.skipped,
            "Engine stopped"
        );

        self.stats
    }
}
