//! Bulk export of everything in the store to flat CSV and JSON files.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::sinks::ReadingStore;

pub const CSV_FILE: &str = "sensor_data_export.csv";
pub const JSON_FILE: &str = "sensor_data_export.json";

#[derive(Debug)]
pub struct ExportPaths {
    pub csv: PathBuf,
    pub json: PathBuf,
}

/// Dumps every stored row to `<out_dir>/sensor_data_export.{csv,json}`.
/// Returns `None` (and writes nothing) when the store is empty.
pub async fn export_all(store: &ReadingStore, out_dir: &Path) -> Result<Option<ExportPaths>> {
    let rows = store.all_rows().await?;
    if rows.is_empty() {
        return Ok(None);
    }

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("create export dir {}", out_dir.display()))?;

    let csv = out_dir.join(CSV_FILE);
    let mut w = BufWriter::new(File::create(&csv)?);
    writeln!(w, "id,timestamp,device_id,sensor_type,value")?;
    for r in &rows {
        writeln!(
            w,
            "{},{},{},{},{}",
            r.id, r.timestamp, r.device_id, r.sensor_type, r.value
        )?;
    }
    w.flush()?;

    let json = out_dir.join(JSON_FILE);
    serde_json::to_writer_pretty(BufWriter::new(File::create(&json)?), &rows)?;

    Ok(Some(ExportPaths { csv, json }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::reading::{Reading, SensorKind};

    #[tokio::test]
    async fn empty_store_exports_nothing() {
        let store = ReadingStore::in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();

        assert!(export_all(&store, dir.path()).await.unwrap().is_none());
        assert!(!dir.path().join(CSV_FILE).exists());
        assert!(!dir.path().join(JSON_FILE).exists());
    }

    #[tokio::test]
    async fn exports_every_row_to_both_files() {
        let store = ReadingStore::in_memory().unwrap();
        for v in [20.5, 21.0, 21.5] {
            store
                .insert(&Reading {
                    timestamp: 1700000000.0,
                    device_id: "temp-1".into(),
                    sensor_type: SensorKind::Temperature,
                    value: v,
                })
                .await
                .unwrap();
        }
        let dir = tempfile::tempdir().unwrap();

        let paths = export_all(&store, dir.path()).await.unwrap().unwrap();

        let csv = std::fs::read_to_string(paths.csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "id,timestamp,device_id,sensor_type,value");
        assert!(lines[1].ends_with(",temp-1,temperature,20.5"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(paths.json).unwrap()).unwrap();
        let arr = json.as_array().unwrap();
        assert_eq!(arr.len(), 3);
        assert_eq!(arr[2]["value"], 21.5);
        assert_eq!(arr[0]["sensor_type"], "temperature");
    }
}
