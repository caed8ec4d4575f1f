pub mod daily_log;
pub mod store;

pub use daily_log::DailyLog;
pub use store::{ReadingStore, SensorStats, StoreError, StoredReading};

use tracing::warn;

use crate::models::reading::Reading;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("daily log write failed: {0}")]
    Log(#[source] std::io::Error),

    #[error("store write failed: {0}")]
    Store(#[source] StoreError),
}

/// Fans one accepted reading out to both sinks. There is no atomicity
/// across the two writes; both are attempted even when one fails, and the
/// first failure is returned only after both ran.
pub struct DualSink {
    log: DailyLog,
    store: ReadingStore,
}

impl DualSink {
    pub fn new(log: DailyLog, store: ReadingStore) -> Self {
        Self { log, store }
    }

    pub fn store(&self) -> &ReadingStore {
        &self.store
    }

    pub async fn persist(&self, reading: &Reading) -> Result<(), SinkError> {
        let log_res = self.log.append(reading).await;
        if let Err(e) = &log_res {
            warn!("daily log append failed: {e}");
        }

        let store_res = self.store.insert(reading).await;
        if let Err(e) = &store_res {
            warn!("store insert failed: {e}");
        }

        log_res.map_err(SinkError::Log)?;
        store_res.map_err(SinkError::Store)
    }
}
