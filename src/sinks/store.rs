//! SQLite store for accepted readings. All DB calls are dispatched via
//! `tokio::task::spawn_blocking` so synchronous SQLite I/O never stalls a
//! runtime worker.

use rusqlite::types::Type;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::models::reading::{Reading, SensorKind};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store path error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store worker panicked: {0}")]
    Join(String),
}

/// A reading as persisted, with the identity the store assigned on insert.
/// The id orders "most recent N" queries and carries no other meaning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredReading {
    pub id: i64,
    pub timestamp: f64,
    pub device_id: String,
    pub sensor_type: SensorKind,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Clone)]
pub struct ReadingStore {
    conn: Arc<Mutex<Connection>>,
}

impl ReadingStore {
    /// Opens (creating directories and the table as needed) the store at
    /// `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path.as_ref())?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA busy_timeout=5000;

            CREATE TABLE IF NOT EXISTS sensor_data (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp   REAL NOT NULL,
                device_id   TEXT NOT NULL,
                sensor_type TEXT NOT NULL,
                value       REAL NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    async fn call<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap();
            op(&guard).map_err(StoreError::from)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }

    /// Inserts one reading as a new row. Duplicate envelopes each get their
    /// own row; deduplication is explicitly not this store's job.
    pub async fn insert(&self, reading: &Reading) -> Result<(), StoreError> {
        let r = reading.clone();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO sensor_data (timestamp, device_id, sensor_type, value) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![r.timestamp, r.device_id, r.sensor_type.as_str(), r.value],
            )
            .map(|_| ())
        })
        .await
    }

    /// The most recently inserted rows, newest first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<StoredReading>, StoreError> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, device_id, sensor_type, value \
                 FROM sensor_data ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], row_to_stored)?;
            rows.collect()
        })
        .await
    }

    /// AVG/MIN/MAX over every stored value of `kind`; `None` when no rows
    /// of that kind exist yet.
    pub async fn stats(&self, kind: SensorKind) -> Result<Option<SensorStats>, StoreError> {
        self.call(move |conn| {
            let (avg, min, max) = conn.query_row(
                "SELECT AVG(value), MIN(value), MAX(value) \
                 FROM sensor_data WHERE sensor_type = ?1",
                params![kind.as_str()],
                |row| {
                    Ok((
                        row.get::<_, Option<f64>>(0)?,
                        row.get::<_, Option<f64>>(1)?,
                        row.get::<_, Option<f64>>(2)?,
                    ))
                },
            )?;
            Ok(match (avg, min, max) {
                (Some(avg), Some(min), Some(max)) => Some(SensorStats { avg, min, max }),
                _ => None,
            })
        })
        .await
    }

    /// Every stored row in insertion order, for bulk export.
    pub async fn all_rows(&self) -> Result<Vec<StoredReading>, StoreError> {
        self.call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, device_id, sensor_type, value \
                 FROM sensor_data ORDER BY id",
            )?;
            let rows = stmt.query_map([], row_to_stored)?;
            rows.collect()
        })
        .await
    }
}

fn row_to_stored(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredReading> {
    let kind_raw: String = row.get(3)?;
    let sensor_type = kind_raw
        .parse::<SensorKind>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    Ok(StoredReading {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        device_id: row.get(2)?,
        sensor_type,
        value: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(kind: SensorKind, value: f64) -> Reading {
        Reading {
            timestamp: 1700000000.0,
            device_id: kind.default_device().to_string(),
            sensor_type: kind,
            value,
        }
    }

    #[tokio::test]
    async fn insert_creates_exactly_one_row() {
        let store = ReadingStore::in_memory().unwrap();
        store
            .insert(&reading(SensorKind::Temperature, 21.5))
            .await
            .unwrap();

        let rows = store.recent(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sensor_type, SensorKind::Temperature);
        assert_eq!(rows[0].value, 21.5);
        assert_eq!(rows[0].device_id, "temp-1");
    }

    #[tokio::test]
    async fn recent_returns_newest_first() {
        let store = ReadingStore::in_memory().unwrap();
        for v in [1.0, 2.0, 3.0] {
            store.insert(&reading(SensorKind::Humidity, v)).await.unwrap();
        }

        let rows = store.recent(2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value, 3.0);
        assert_eq!(rows[1].value, 2.0);
        assert!(rows[0].id > rows[1].id);
    }

    #[tokio::test]
    async fn duplicate_envelopes_each_get_a_row() {
        let store = ReadingStore::in_memory().unwrap();
        let r = reading(SensorKind::Motion, 1.0);
        store.insert(&r).await.unwrap();
        store.insert(&r).await.unwrap();
        assert_eq!(store.recent(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stats_aggregate_per_kind() {
        let store = ReadingStore::in_memory().unwrap();
        for v in [20.0, 22.0, 24.0] {
            store
                .insert(&reading(SensorKind::Temperature, v))
                .await
                .unwrap();
        }
        store.insert(&reading(SensorKind::Motion, 1.0)).await.unwrap();

        let s = store.stats(SensorKind::Temperature).await.unwrap().unwrap();
        assert_eq!(s.avg, 22.0);
        assert_eq!(s.min, 20.0);
        assert_eq!(s.max, 24.0);

        assert!(store.stats(SensorKind::Humidity).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn all_rows_in_insertion_order() {
        let store = ReadingStore::in_memory().unwrap();
        for v in [5.0, 6.0] {
            store.insert(&reading(SensorKind::Humidity, v)).await.unwrap();
        }
        let rows = store.all_rows().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value, 5.0);
        assert_eq!(rows[1].value, 6.0);
    }

    #[tokio::test]
    async fn open_is_idempotent_on_the_same_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sensors.db");

        let store = ReadingStore::open(&path).unwrap();
        store.insert(&reading(SensorKind::Humidity, 44.0)).await.unwrap();
        drop(store);

        // Re-opening must not clobber existing data.
        let store = ReadingStore::open(&path).unwrap();
        assert_eq!(store.recent(10).await.unwrap().len(), 1);
    }
}
