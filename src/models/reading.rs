use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ---- Wire schema (telemetry on MQTT) ----

/// Closed set of sensor kinds carried on the bus. The wire names are the
/// lowercase variants; nothing outside this set passes validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Temperature,
    Humidity,
    Motion,
}

impl SensorKind {
    pub const ALL: [SensorKind; 3] = [
        SensorKind::Temperature,
        SensorKind::Humidity,
        SensorKind::Motion,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
            SensorKind::Motion => "motion",
        }
    }

    /// Device id used when the caller does not name one, one simulated
    /// instance per kind.
    pub fn default_device(self) -> &'static str {
        match self {
            SensorKind::Temperature => "temp-1",
            SensorKind::Humidity => "hum-1",
            SensorKind::Motion => "motion-1",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Asking for a kind outside the closed set is a configuration error of the
/// caller, fatal to the loop that requested it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unsupported sensor kind '{0}' (expected temperature, humidity or motion)")]
pub struct UnsupportedSensorKind(pub String);

impl FromStr for SensorKind {
    type Err = UnsupportedSensorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temperature" => Ok(SensorKind::Temperature),
            "humidity" => Ok(SensorKind::Humidity),
            "motion" => Ok(SensorKind::Motion),
            other => Err(UnsupportedSensorKind(other.to_string())),
        }
    }
}

/// One telemetry envelope, as exchanged on the bus and persisted by the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Producer-assigned publish time, seconds since the Unix epoch.
    pub timestamp: f64,
    pub device_id: String,
    pub sensor_type: SensorKind,
    pub value: f64,
}

impl Reading {
    /// Builds an envelope stamped with the current wall-clock time.
    pub fn now(sensor_type: SensorKind, device_id: impl Into<String>, value: f64) -> Self {
        Self {
            timestamp: epoch_secs(),
            device_id: device_id.into(),
            sensor_type,
            value,
        }
    }
}

/// Wall-clock seconds since the Unix epoch, sub-second precision.
pub fn epoch_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
