pub mod config;
pub mod export;
pub mod models;
pub mod publisher;
pub mod sensor;
pub mod sinks;
pub mod subscriber;
pub mod transport;

pub use config::Config;
pub use models::reading::{Reading, SensorKind, UnsupportedSensorKind};
pub use models::schema::{decode, validate, DecodeError, SchemaViolation};
pub use sinks::{DailyLog, DualSink, ReadingStore, SinkError};
pub use transport::{BusConfig, BusMessage, MessageSource, PublishSink, Qos};
