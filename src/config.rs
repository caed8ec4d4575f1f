//! Startup configuration, read from the environment exactly once and passed
//! by reference into each component. Nothing below `main` looks at the
//! environment.

use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub broker_host: String,
    pub broker_port: u16,
    pub topic_prefix: String,
    pub csv_dir: PathBuf,
    pub db_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            broker_host: env::var("BROKER_URL").unwrap_or_else(|_| "localhost".to_string()),
            broker_port: env::var("BROKER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1883),
            topic_prefix: env::var("TOPIC_PREFIX").unwrap_or_else(|_| "home/sensors".to_string()),
            csv_dir: env::var("CSV_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/logs")),
            db_path: env::var("DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/database/sensors.db")),
        }
    }
}
