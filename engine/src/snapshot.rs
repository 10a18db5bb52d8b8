//! Snapshot types for persisting and restoring local storage.
//!
//! Snapshots are the bridge between [`MemoryStorage`](crate::MemoryStorage)
//! and disk. They are designed for deterministic serialization.

use crate::{error::Result, memory::Collection, record::field, CollectionName, Error};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A point-in-time snapshot of local storage.
///
/// Uses BTreeMap instead of HashMap for deterministic serialization order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// Every collection with its indexes and rows
    pub collections: BTreeMap<CollectionName, Collection>,
}

impl Default for StorageSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageSnapshot {
    /// Create a new empty snapshot.
    pub fn new() -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            collections: BTreeMap::new(),
        }
    }

    /// Count total rows across all collections.
    pub fn row_count(&self) -> usize {
        self.collections.values().map(|c| c.len()).sum()
    }

    /// Count rows with unsynced local changes.
    pub fn dirty_row_count(&self) -> usize {
        self.collections
            .values()
            .flat_map(|c| c.rows.values())
            .filter(|r| crate::record::row_flag(r, field::LOCAL))
            .count()
    }

    /// Check every row is keyed by its own entry id and ids will not be reused.
    pub fn validate(&self) -> Result<()> {
        if self.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                self.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        for (name, collection) in &self.collections {
            for (id, row) in &collection.rows {
                if row.get(field::ENTRY_ID).and_then(Value::as_u64) != Some(*id) {
                    return Err(Error::InvalidSnapshot(format!(
                        "row {id} in {name} carries a different entry id"
                    )));
                }
                if *id >= collection.next_entry_id {
                    return Err(Error::InvalidSnapshot(format!(
                        "row {id} in {name} is not below the next entry id {}",
                        collection.next_entry_id
                    )));
                }
            }
        }

        Ok(())
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Serialize to pretty JSON with deterministic ordering.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{schema::base_indexes, LocalStorage, MemoryStorage};
    use serde_json::json;

    fn populated() -> StorageSnapshot {
        let storage = MemoryStorage::new();
        storage.register_collection("Quote", &base_indexes()).unwrap();
        let rows = vec![
            json!({"ExternalId": "a", "__local__": true}),
            json!({"ExternalId": "b"}),
        ]
        .into_iter()
        .map(|v| match v {
            Value::Object(map) => map,
            _ => unreachable!(),
        })
        .collect();
        storage.upsert(rows, "Quote").unwrap();
        storage.export_snapshot()
    }

    #[test]
    fn counts() {
        let snapshot = populated();
        assert_eq!(snapshot.row_count(), 2);
        assert_eq!(snapshot.dirty_row_count(), 1);
    }

    #[test]
    fn deterministic_json() {
        let snapshot = populated();
        assert_eq!(snapshot.to_json().unwrap(), snapshot.clone().to_json().unwrap());
        let parsed = StorageSnapshot::from_json(&snapshot.to_json_pretty().unwrap()).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn rejects_future_format() {
        let mut snapshot = StorageSnapshot::new();
        snapshot.format_version = SNAPSHOT_FORMAT_VERSION + 1;
        let json = snapshot.to_json().unwrap();
        assert!(matches!(
            StorageSnapshot::from_json(&json),
            Err(Error::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn rejects_mismatched_entry_id() {
        let mut snapshot = populated();
        let collection = snapshot.collections.get_mut("Quote").unwrap();
        let row = collection.rows.remove(&1).unwrap();
        collection.rows.insert(5, row);
        collection.next_entry_id = 6;

        assert!(matches!(snapshot.validate(), Err(Error::InvalidSnapshot(_))));
    }

    #[test]
    fn rejects_reused_entry_ids() {
        let mut snapshot = populated();
        snapshot.collections.get_mut("Quote").unwrap().next_entry_id = 1;
        assert!(matches!(snapshot.validate(), Err(Error::InvalidSnapshot(_))));
    }

    #[test]
    fn invalid_json() {
        assert!(matches!(
            StorageSnapshot::from_json("{not json"),
            Err(Error::InvalidSnapshot(_))
        ));
    }
}
