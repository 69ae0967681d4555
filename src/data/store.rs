//! Record store seam: where delivery history comes from.

use std::path::{Path, PathBuf};

use crate::core::errors::{FleetError, Result};
use crate::data::record::DeliveryRecord;

/// Supplies delivery records ordered ascending by date.
pub trait RecordStore: Send + Sync {
    /// All known deliveries, oldest first.
    fn fetch_deliveries(&self) -> Result<Vec<DeliveryRecord>>;
}

/// Records held in memory (tests, embedding callers).
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    records: Vec<DeliveryRecord>,
}

impl MemoryRecordStore {
    #[must_use]
    pub fn new(mut records: Vec<DeliveryRecord>) -> Self {
        records.sort_by_key(|r| r.delivery_date);
        Self { records }
    }
}

impl RecordStore for MemoryRecordStore {
    fn fetch_deliveries(&self) -> Result<Vec<DeliveryRecord>> {
        Ok(self.records.clone())
    }
}

/// Records exported to disk, either as a JSON array or as JSON lines.
#[derive(Debug, Clone)]
pub struct JsonRecordStore {
    path: PathBuf,
}

impl JsonRecordStore {
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn parse(raw: &str) -> Result<Vec<DeliveryRecord>> {
        if raw.trim_start().starts_with('[') {
            return Ok(serde_json::from_str(raw)?);
        }
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(FleetError::from))
            .collect()
    }
}

impl RecordStore for JsonRecordStore {
    fn fetch_deliveries(&self) -> Result<Vec<DeliveryRecord>> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| FleetError::io(&self.path, e))?;
        let mut records = Self::parse(&raw)?;
        records.sort_by_key(|r| r.delivery_date);
        tracing::info!(
            path = %self.path.display(),
            records = records.len(),
            "loaded delivery records"
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE_A: &str = r#"{"id":"a","originId":"o1","destinationId":"d1","vehicleId":"v1","demand":3,"distance":20.0,"totalCost":40.0,"deliveryDate":"2024-05-02","isAlpine":false,"hasOvertime":true,"vehicleType":"van","originCategory":"hub","destinationCategory":"shop"}"#;
    const LINE_B: &str = r#"{"id":"b","originId":"o2","destinationId":"d1","vehicleId":"v2","demand":5,"distance":35.0,"totalCost":61.0,"deliveryDate":"2024-05-01","isAlpine":true,"hasOvertime":false,"vehicleType":"truck","originCategory":"depot","destinationCategory":"shop"}"#;

    #[test]
    fn json_lines_are_loaded_and_sorted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("deliveries.jsonl");
        std::fs::write(&path, format!("{LINE_A}\n\n{LINE_B}\n")).expect("write");
        let records = JsonRecordStore::new(&path)
            .fetch_deliveries()
            .expect("fetch");
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn json_array_is_loaded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("deliveries.json");
        std::fs::write(&path, format!("[{LINE_A},{LINE_B}]")).expect("write");
        let records = JsonRecordStore::new(&path)
            .fetch_deliveries()
            .expect("fetch");
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = JsonRecordStore::new("/nonexistent/fleetcast/records.json")
            .fetch_deliveries()
            .expect_err("missing file");
        assert_eq!(err.code(), "FLC-3002");
    }

    #[test]
    fn malformed_line_is_serialization_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.jsonl");
        std::fs::write(&path, format!("{LINE_A}\n{{\"id\":\n")).expect("write");
        let err = JsonRecordStore::new(&path)
            .fetch_deliveries()
            .expect_err("broken line");
        assert_eq!(err.code(), "FLC-2101");
    }
}
