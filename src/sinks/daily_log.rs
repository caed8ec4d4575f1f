//! Append-only daily log: one delimited file per local calendar day, header
//! written once at file creation, one row per accepted reading. Files are
//! never rewritten or deleted here.

use chrono::Local;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::models::reading::Reading;

pub const HEADER: &str = "timestamp,device_id,sensor_type,value";

pub struct DailyLog {
    dir: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl DailyLog {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock: Arc::new(Mutex::new(())),
        })
    }

    /// The file the next append would land in.
    pub fn today_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}_sensors.csv", Local::now().format("%Y-%m-%d")))
    }

    /// Appends one reading to today's file, creating it (with header) on the
    /// first write of a new day. Writes are serialized behind a lock and run
    /// on the blocking pool.
    pub async fn append(&self, reading: &Reading) -> io::Result<()> {
        let path = self.today_path();
        let lock = Arc::clone(&self.lock);
        let row = row(reading);
        tokio::task::spawn_blocking(move || {
            let _guard = lock.lock().unwrap();
            let is_new = !path.exists();
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            if is_new {
                writeln!(file, "{HEADER}")?;
            }
            writeln!(file, "{row}")
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?
    }
}

fn row(r: &Reading) -> String {
    format!("{},{},{},{}", r.timestamp, r.device_id, r.sensor_type, r.value)
}
