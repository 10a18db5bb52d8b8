//! In-process local storage.
//!
//! [`MemoryStorage`] keeps every collection in memory behind a
//! [`DashMap`], so concurrent stores can share it without extra locking.
//! State can be persisted and restored through [`StorageSnapshot`].

use crate::{
    error::Result, query::QuerySpec, record::field, snapshot::StorageSnapshot, CollectionName,
    EntryId, Error, IndexSpec, LocalStorage, Row,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A registered collection of rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub(crate) indexes: Vec<IndexSpec>,
    pub(crate) rows: BTreeMap<EntryId, Row>,
    pub(crate) next_entry_id: EntryId,
}

impl Collection {
    /// Create an empty collection.
    pub fn new(indexes: Vec<IndexSpec>) -> Self {
        Self {
            indexes,
            rows: BTreeMap::new(),
            next_entry_id: 1,
        }
    }

    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    /// Get a row by entry id.
    pub fn get(&self, id: EntryId) -> Option<&Row> {
        self.rows.get(&id)
    }

    /// Insert or replace a row, assigning an entry id when it has none.
    pub fn upsert(&mut self, mut row: Row) -> Row {
        let id = match row.get(field::ENTRY_ID).and_then(Value::as_u64) {
            Some(id) => {
                self.next_entry_id = self.next_entry_id.max(id + 1);
                id
            }
            None => {
                let id = self.next_entry_id;
                self.next_entry_id += 1;
                id
            }
        };

        row.insert(field::ENTRY_ID.to_string(), Value::from(id));
        row.insert(
            field::LAST_MODIFIED.to_string(),
            Value::from(chrono::Utc::now().timestamp_millis()),
        );
        self.rows.insert(id, row.clone());
        row
    }

    pub fn remove(&mut self, id: EntryId) -> Option<Row> {
        self.rows.remove(&id)
    }

    /// Count of all rows, tombstones included.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn is_indexed(&self, path: &str) -> bool {
        path == field::ENTRY_ID || self.indexes.iter().any(|i| i.path == path)
    }

    /// Ensure every path the query touches is indexed.
    fn check_spec(&self, spec: &QuerySpec) -> Result<()> {
        let paths = spec
            .predicates
            .iter()
            .map(|p| p.path())
            .chain(std::iter::once(spec.order_path.as_str()));
        for path in paths {
            if !self.is_indexed(path) {
                return Err(Error::StorageRead(format!(
                    "path '{}' is not indexed in {}",
                    path, spec.collection
                )));
            }
        }
        Ok(())
    }

    /// Matching rows in query order. Ties keep entry-id order.
    fn matching(&self, spec: &QuerySpec) -> Vec<&Row> {
        let mut rows: Vec<&Row> = self.rows.values().filter(|r| spec.matches(r)).collect();
        rows.sort_by(|a, b| spec.compare(a, b));
        rows
    }
}

/// Local storage kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    collections: DashMap<CollectionName, Collection>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore storage from a snapshot.
    pub fn from_snapshot(snapshot: StorageSnapshot) -> Result<Self> {
        let storage = Self::new();
        storage.import_snapshot(snapshot)?;
        Ok(storage)
    }

    /// Export the current state as a snapshot.
    pub fn export_snapshot(&self) -> StorageSnapshot {
        let mut snapshot = StorageSnapshot::new();
        for entry in self.collections.iter() {
            snapshot
                .collections
                .insert(entry.key().clone(), entry.value().clone());
        }
        snapshot
    }

    /// Replace the current state with the snapshot's state.
    pub fn import_snapshot(&self, snapshot: StorageSnapshot) -> Result<()> {
        snapshot.validate()?;
        self.collections.clear();
        for (name, collection) in snapshot.collections {
            self.collections.insert(name, collection);
        }
        Ok(())
    }

    /// Number of rows in a collection, tombstones included.
    pub fn row_count(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    /// Every row of a collection in entry-id order.
    pub fn rows(&self, collection: &str) -> Vec<Row> {
        self.collections
            .get(collection)
            .map(|c| c.rows.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl LocalStorage for MemoryStorage {
    fn collection_exists(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    fn register_collection(&self, name: &str, indexes: &[IndexSpec]) -> Result<()> {
        if name.is_empty() {
            return Err(Error::SchemaRegistration {
                collection: name.to_string(),
                reason: "collection name must not be empty".into(),
            });
        }
        if indexes.is_empty() {
            return Err(Error::SchemaRegistration {
                collection: name.to_string(),
                reason: "at least one index is required".into(),
            });
        }

        self.collections
            .entry(name.to_string())
            .or_insert_with(|| Collection::new(indexes.to_vec()));
        Ok(())
    }

    fn upsert(&self, rows: Vec<Row>, collection: &str) -> Result<Vec<Row>> {
        let mut target = self
            .collections
            .get_mut(collection)
            .ok_or_else(|| Error::StorageWrite(format!("collection not found: {collection}")))?;
        Ok(rows.into_iter().map(|row| target.upsert(row)).collect())
    }

    fn count(&self, spec: &QuerySpec) -> Result<usize> {
        let collection = self
            .collections
            .get(&spec.collection)
            .ok_or_else(|| Error::UnknownCollection(spec.collection.clone()))?;
        collection.check_spec(spec)?;
        Ok(collection.matching(spec).len())
    }

    fn query(&self, spec: &QuerySpec, page_index: usize) -> Result<Vec<Row>> {
        let collection = self
            .collections
            .get(&spec.collection)
            .ok_or_else(|| Error::UnknownCollection(spec.collection.clone()))?;
        collection.check_spec(spec)?;

        let skip = page_index.saturating_mul(spec.page_size);
        Ok(collection
            .matching(spec)
            .into_iter()
            .skip(skip)
            .take(spec.page_size)
            .cloned()
            .collect())
    }

    fn remove(&self, collection: &str, entry_ids: &[EntryId]) -> Result<()> {
        let mut target = self
            .collections
            .get_mut(collection)
            .ok_or_else(|| Error::StorageWrite(format!("collection not found: {collection}")))?;
        for id in entry_ids {
            target.remove(*id);
        }
        Ok(())
    }

    fn clear(&self) {
        self.collections.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Order;
    use crate::schema::base_indexes;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn storage() -> MemoryStorage {
        let storage = MemoryStorage::new();
        let mut indexes = base_indexes();
        indexes.push(IndexSpec::string("Key"));
        storage.register_collection("Quote", &indexes).unwrap();
        storage
    }

    #[test]
    fn register_is_idempotent() {
        let storage = storage();
        storage
            .upsert(vec![row(json!({"Key": "a"}))], "Quote")
            .unwrap();

        // Re-registering must not wipe rows
        storage
            .register_collection("Quote", &base_indexes())
            .unwrap();
        assert_eq!(storage.row_count("Quote"), 1);
    }

    #[test]
    fn register_rejects_empty_index_spec() {
        let storage = MemoryStorage::new();
        let result = storage.register_collection("Quote", &[]);
        assert!(matches!(result, Err(Error::SchemaRegistration { .. })));
        assert!(!storage.collection_exists("Quote"));
    }

    #[test]
    fn upsert_assigns_and_keeps_ids() {
        let storage = storage();

        let inserted = storage
            .upsert(
                vec![row(json!({"Key": "a"})), row(json!({"Key": "b"}))],
                "Quote",
            )
            .unwrap();
        assert_eq!(inserted[0][field::ENTRY_ID], json!(1));
        assert_eq!(inserted[1][field::ENTRY_ID], json!(2));
        assert!(inserted[0].contains_key(field::LAST_MODIFIED));

        let mut changed = inserted[0].clone();
        changed.insert("Key".into(), json!("c"));
        let updated = storage.upsert(vec![changed], "Quote").unwrap();
        assert_eq!(updated[0][field::ENTRY_ID], json!(1));
        assert_eq!(storage.row_count("Quote"), 2);
    }

    #[test]
    fn upsert_unknown_collection() {
        let storage = MemoryStorage::new();
        let result = storage.upsert(vec![Row::new()], "Missing");
        assert!(matches!(result, Err(Error::StorageWrite(_))));
    }

    #[test]
    fn query_pages_in_order() {
        let storage = storage();
        let rows = ["d", "b", "a", "c"]
            .iter()
            .map(|k| row(json!({ "Key": k })))
            .collect();
        storage.upsert(rows, "Quote").unwrap();

        let spec = QuerySpec::list("Quote", "Key", 2).unwrap();
        let first = storage.query(&spec, 0).unwrap();
        let second = storage.query(&spec, 1).unwrap();
        let third = storage.query(&spec, 2).unwrap();

        let keys: Vec<_> = first.iter().chain(&second).map(|r| r["Key"].clone()).collect();
        assert_eq!(keys, vec![json!("a"), json!("b"), json!("c"), json!("d")]);
        assert!(third.is_empty());
        assert_eq!(storage.count(&spec).unwrap(), 4);
    }

    #[test]
    fn query_rejects_unindexed_paths() {
        let storage = storage();
        let spec = QuerySpec::all("Quote", "Status", Order::Ascending, 10).unwrap();
        assert!(matches!(storage.query(&spec, 0), Err(Error::StorageRead(_))));
        assert!(matches!(storage.count(&spec), Err(Error::StorageRead(_))));
    }

    #[test]
    fn query_unknown_collection() {
        let storage = MemoryStorage::new();
        let spec = QuerySpec::list("Quote", "Key", 10).unwrap();
        assert!(matches!(
            storage.query(&spec, 0),
            Err(Error::UnknownCollection(_))
        ));
    }

    #[test]
    fn remove_and_clear() {
        let storage = storage();
        let rows = storage
            .upsert(vec![row(json!({"Key": "a"})), row(json!({"Key": "b"}))], "Quote")
            .unwrap();
        let id = rows[0][field::ENTRY_ID].as_u64().unwrap();

        storage.remove("Quote", &[id]).unwrap();
        assert_eq!(storage.row_count("Quote"), 1);

        storage.clear();
        assert!(!storage.collection_exists("Quote"));
    }

    #[test]
    fn snapshot_roundtrip() {
        let storage = storage();
        storage
            .upsert(vec![row(json!({"Key": "a", "Amount": 12.5}))], "Quote")
            .unwrap();

        let json = storage.export_snapshot().to_json().unwrap();
        let restored = MemoryStorage::from_snapshot(StorageSnapshot::from_json(&json).unwrap())
            .unwrap();

        assert_eq!(restored.rows("Quote"), storage.rows("Quote"));

        // Entry ids continue after the restored maximum
        let next = restored
            .upsert(vec![row(json!({"Key": "b"}))], "Quote")
            .unwrap();
        assert_eq!(next[0][field::ENTRY_ID], json!(2));
    }
}
