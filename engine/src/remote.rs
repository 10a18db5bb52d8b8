//! Remote object source.
//!
//! The cloud backend is only ever reached through [`RemoteSource`]. The
//! wire protocol behind it is not this crate's concern; [`MemoryRemote`]
//! stands in for it in tests and local runs.

use crate::{error::Result, query::compare_values, record::field, Error, Row, SyncDownTarget, Timestamp};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch the rows a sync-down target selects.
    async fn fetch(&self, target: &SyncDownTarget) -> Result<Vec<Row>>;

    /// Create an object and return its server id.
    async fn create(&self, object_name: &str, fields: Row) -> Result<String>;

    async fn update(&self, object_name: &str, id: &str, fields: Row) -> Result<()>;

    async fn delete(&self, object_name: &str, id: &str) -> Result<()>;

    /// Last modification stamp of an object, `None` if it does not exist.
    async fn last_modified(&self, object_name: &str, id: &str) -> Result<Option<Timestamp>>;
}

/// Remote source held in memory.
#[derive(Debug)]
pub struct MemoryRemote {
    objects: DashMap<String, BTreeMap<String, Row>>,
    failing: DashSet<String>,
    next_id: AtomicU64,
    clock: AtomicI64,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
            failing: DashSet::new(),
            next_id: AtomicU64::new(1),
            clock: AtomicI64::new(chrono::Utc::now().timestamp_millis()),
        }
    }

    fn tick(&self) -> Timestamp {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn mint_id(&self, object_name: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{object_name}-{n:06}")
    }

    fn check_available(&self, object_name: &str) -> Result<()> {
        if self.failing.contains(object_name) {
            return Err(Error::Remote(format!("{object_name} is unavailable")));
        }
        Ok(())
    }

    /// Insert objects as if another client had created them. Rows without an
    /// `Id` get one minted. Returns the ids in input order.
    pub fn seed(&self, object_name: &str, rows: Vec<Row>) -> Vec<String> {
        let mut objects = self.objects.entry(object_name.to_string()).or_default();
        rows.into_iter()
            .map(|mut row| {
                let id = match row.get(field::ID).and_then(Value::as_str) {
                    Some(id) => id.to_string(),
                    None => self.mint_id(object_name),
                };
                row.insert(field::ID.to_string(), Value::from(id.clone()));
                row.insert(
                    field::REMOTE_LAST_MODIFIED.to_string(),
                    Value::from(self.tick()),
                );
                objects.insert(id.clone(), row);
                id
            })
            .collect()
    }

    /// Simulate an edit made by another client.
    pub fn touch(&self, object_name: &str, id: &str, fields: Row) -> Result<()> {
        let mut objects = self
            .objects
            .get_mut(object_name)
            .ok_or_else(|| Error::Remote(format!("no {object_name} objects")))?;
        let row = objects
            .get_mut(id)
            .ok_or_else(|| Error::Remote(format!("{object_name} {id} not found")))?;
        row.extend(fields);
        row.insert(
            field::REMOTE_LAST_MODIFIED.to_string(),
            Value::from(self.tick()),
        );
        Ok(())
    }

    /// Make every call for `object_name` fail until [`MemoryRemote::recover`].
    pub fn fail(&self, object_name: &str) {
        self.failing.insert(object_name.to_string());
    }

    pub fn recover(&self, object_name: &str) {
        self.failing.remove(object_name);
    }

    pub fn get(&self, object_name: &str, id: &str) -> Option<Row> {
        self.objects.get(object_name)?.get(id).cloned()
    }

    pub fn len(&self, object_name: &str) -> usize {
        self.objects.get(object_name).map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, object_name: &str) -> bool {
        self.len(object_name) == 0
    }
}

#[async_trait]
impl RemoteSource for MemoryRemote {
    async fn fetch(&self, target: &SyncDownTarget) -> Result<Vec<Row>> {
        self.check_available(&target.object_name)?;

        let Some(objects) = self.objects.get(&target.object_name) else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<Row> = objects
            .values()
            .map(|row| {
                row.iter()
                    .filter(|(key, _)| {
                        key.as_str() == field::ID
                            || key.as_str() == field::REMOTE_LAST_MODIFIED
                            || target.fields.iter().any(|f| f == *key)
                    })
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .collect();
        rows.sort_by(|a, b| compare_values(a.get(&target.order_path), b.get(&target.order_path)));
        rows.truncate(target.limit);
        Ok(rows)
    }

    async fn create(&self, object_name: &str, mut fields: Row) -> Result<String> {
        self.check_available(object_name)?;

        let id = self.mint_id(object_name);
        fields.insert(field::ID.to_string(), Value::from(id.clone()));
        fields.insert(
            field::REMOTE_LAST_MODIFIED.to_string(),
            Value::from(self.tick()),
        );
        self.objects
            .entry(object_name.to_string())
            .or_default()
            .insert(id.clone(), fields);
        Ok(id)
    }

    async fn update(&self, object_name: &str, id: &str, fields: Row) -> Result<()> {
        self.check_available(object_name)?;
        self.touch(object_name, id, fields)
    }

    async fn delete(&self, object_name: &str, id: &str) -> Result<()> {
        self.check_available(object_name)?;

        let removed = self
            .objects
            .get_mut(object_name)
            .and_then(|mut objects| objects.remove(id));
        match removed {
            Some(_) => Ok(()),
            None => Err(Error::Remote(format!("{object_name} {id} not found"))),
        }
    }

    async fn last_modified(&self, object_name: &str, id: &str) -> Result<Option<Timestamp>> {
        self.check_available(object_name)?;

        Ok(self
            .get(object_name, id)
            .and_then(|row| row.get(field::REMOTE_LAST_MODIFIED).and_then(Value::as_i64)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn target(fields: &[&str]) -> SyncDownTarget {
        SyncDownTarget {
            object_name: "Product2".into(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            order_path: "Name".into(),
            limit: 10,
        }
    }

    #[tokio::test]
    async fn fetch_projects_and_orders() {
        let remote = MemoryRemote::new();
        remote.seed(
            "Product2",
            vec![
                row(json!({"Name": "b", "Secret": 1})),
                row(json!({"Name": "a", "Secret": 2})),
            ],
        );

        let rows = remote.fetch(&target(&["Name"])).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Name"], json!("a"));
        assert!(rows[0].contains_key(field::ID));
        assert!(rows[0].contains_key(field::REMOTE_LAST_MODIFIED));
        assert!(!rows[0].contains_key("Secret"));
    }

    #[tokio::test]
    async fn fetch_respects_limit() {
        let remote = MemoryRemote::new();
        let rows = (0..5).map(|i| row(json!({ "Name": format!("p{i}") }))).collect();
        remote.seed("Product2", rows);

        let mut target = target(&["Name"]);
        target.limit = 3;
        assert_eq!(remote.fetch(&target).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn create_update_delete() {
        let remote = MemoryRemote::new();

        let id = remote
            .create("Product2", row(json!({"Name": "Widget"})))
            .await
            .unwrap();
        let created = remote.last_modified("Product2", &id).await.unwrap().unwrap();

        remote
            .update("Product2", &id, row(json!({"Name": "Gadget"})))
            .await
            .unwrap();
        assert_eq!(remote.get("Product2", &id).unwrap()["Name"], json!("Gadget"));
        let updated = remote.last_modified("Product2", &id).await.unwrap().unwrap();
        assert!(updated > created);

        remote.delete("Product2", &id).await.unwrap();
        assert!(remote.is_empty("Product2"));
        assert!(remote.delete("Product2", &id).await.is_err());
        assert_eq!(remote.last_modified("Product2", &id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn failing_object() {
        let remote = MemoryRemote::new();
        remote.fail("Product2");

        let result = remote.fetch(&target(&["Name"])).await;
        assert!(matches!(result, Err(Error::Remote(_))));

        remote.recover("Product2");
        assert!(remote.fetch(&target(&["Name"])).await.unwrap().is_empty());
    }
}
