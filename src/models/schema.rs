//! Two-phase message checking: `decode` turns raw bytes into a JSON document
//! (or fails with [`DecodeError`]), `validate` checks the document's shape
//! against the fixed telemetry schema (or fails with [`SchemaViolation`]).
//!
//! Validation is deliberately loose in two documented ways: an empty
//! `device_id` is accepted, and `value` is type-checked but never
//! range-checked.

use serde_json::Value;

use crate::models::reading::{Reading, SensorKind};

pub const REQUIRED_FIELDS: [&str; 4] = ["timestamp", "device_id", "sensor_type", "value"];

/// The payload could not be read as a JSON document at all.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// The document decoded but does not match the telemetry schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaViolation {
    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("required field '{0}' is missing")]
    MissingField(&'static str),

    #[error("field '{0}' must be numeric")]
    NotNumeric(&'static str),

    #[error("field '{0}' must be a string")]
    NotAString(&'static str),

    #[error("sensor_type '{0}' is not one of temperature, humidity, motion")]
    UnknownSensorType(String),
}

pub fn decode(payload: &[u8]) -> Result<Value, DecodeError> {
    let text = std::str::from_utf8(payload)?;
    Ok(serde_json::from_str(text)?)
}

/// Checks presence and types of the four required fields, in a fixed order,
/// and builds the typed envelope. Pure: never persists, never publishes.
/// Extra fields are tolerated, not rejected.
pub fn validate(doc: &Value) -> Result<Reading, SchemaViolation> {
    let obj = doc.as_object().ok_or(SchemaViolation::NotAnObject)?;

    for field in REQUIRED_FIELDS {
        if !obj.contains_key(field) {
            return Err(SchemaViolation::MissingField(field));
        }
    }

    let timestamp = obj["timestamp"]
        .as_f64()
        .ok_or(SchemaViolation::NotNumeric("timestamp"))?;

    let device_id = obj["device_id"]
        .as_str()
        .ok_or(SchemaViolation::NotAString("device_id"))?
        .to_string();

    let kind_raw = obj["sensor_type"]
        .as_str()
        .ok_or(SchemaViolation::NotAString("sensor_type"))?;
    let sensor_type = kind_raw
        .parse::<SensorKind>()
        .map_err(|_| SchemaViolation::UnknownSensorType(kind_raw.to_string()))?;

    let value = obj["value"]
        .as_f64()
        .ok_or(SchemaViolation::NotNumeric("value"))?;

    Ok(Reading {
        timestamp,
        device_id,
        sensor_type,
        value,
    })
}
