use async_trait::async_trait;
use rand::{Rng, SeedableRng, rngs::StdRng};

use super::{EnvironmentReading, MeasurementSource, SensorError};

/// Sensor stand-in that drifts around plausible indoor conditions.
///
/// Each read moves every value by a small random step and keeps it inside a
/// fixed band, so consecutive samples look like a slowly changing room.
pub struct SimulatedSensor {
    rng: StdRng,
    current: EnvironmentReading,
}

impl SimulatedSensor {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Reproducible sequence for tests and demos.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            current: EnvironmentReading {
                temperature_c: 21.0,
                humidity_pct: 45.0,
                pressure_hpa: 1013.0,
            },
        }
    }

    fn step(&mut self) -> EnvironmentReading {
        let rng = &mut self.rng;
        let c = &mut self.current;

        c.temperature_c = (c.temperature_c + rng.random_range(-0.2..0.2)).clamp(15.0, 30.0);
        c.humidity_pct = (c.humidity_pct + rng.random_range(-1.0..1.0)).clamp(20.0, 80.0);
        c.pressure_hpa = (c.pressure_hpa + rng.random_range(-0.3..0.3)).clamp(980.0, 1040.0);

        *c
    }
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MeasurementSource for SimulatedSensor {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn read(&mut self) -> Result<EnvironmentReading, SensorError> {
        Ok(self.step())
    }
}
