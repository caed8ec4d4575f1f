//! Bounded-random telemetry values, one generator per simulated sensor.

use rand::prelude::*;

use crate::models::reading::SensorKind;

pub struct ValueGenerator {
    rng: StdRng,
}

impl ValueGenerator {
    /// Deterministic generator for reproducible runs and tests.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// One reading for `kind`: temperature uniform in [18.0, 30.0] °C,
    /// humidity uniform in [30.0, 90.0] %RH (both rounded to 2 decimal
    /// places), motion a uniform pick from {0, 1}.
    pub fn sample(&mut self, kind: SensorKind) -> f64 {
        match kind {
            SensorKind::Temperature => round2(self.rng.gen_range(18.0..=30.0)),
            SensorKind::Humidity => round2(self.rng.gen_range(30.0..=90.0)),
            SensorKind::Motion => f64::from(self.rng.gen_range(0u8..=1)),
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
