//! Record types and the row boundary.
//!
//! Local storage only understands [`Row`]s: flat JSON objects. Entities are
//! typed structs that cross that boundary through [`Entity::from_row`] and
//! [`Entity::to_row`]. Bookkeeping lives in [`RecordMeta`], which every
//! entity flattens into its row.

use crate::{error::Result, EntryId, Error, Timestamp};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// The generic row representation used by local storage.
pub type Row = serde_json::Map<String, Value>;

/// Reserved row keys.
pub mod field {
    /// Storage-assigned row id.
    pub const ENTRY_ID: &str = "_soupEntryId";
    /// Storage-assigned last modification stamp (milliseconds since epoch).
    pub const LAST_MODIFIED: &str = "_soupLastModifiedDate";
    /// Nested object carrying the type tag.
    pub const ATTRIBUTES: &str = "attributes";
    /// Server-assigned id.
    pub const ID: &str = "Id";
    /// Business-stable id that survives sync.
    pub const EXTERNAL_ID: &str = "ExternalId";
    /// Remote modification stamp as of the last sync.
    pub const REMOTE_LAST_MODIFIED: &str = "LastModifiedDate";
    pub const LOCAL: &str = "__local__";
    pub const LOCALLY_CREATED: &str = "__locally_created__";
    pub const LOCALLY_UPDATED: &str = "__locally_updated__";
    pub const LOCALLY_DELETED: &str = "__locally_deleted__";
}

/// Type tag attached to every row written through a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    #[serde(rename = "type")]
    pub object_type: String,
}

/// Bookkeeping shared by every entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    #[serde(rename = "_soupEntryId", default, skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<EntryId>,
    #[serde(
        rename = "_soupLastModifiedDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_modified: Option<Timestamp>,
    #[serde(rename = "attributes", default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Attributes>,
    /// Id assigned by the remote source once the record has been synced up
    #[serde(rename = "Id", default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(rename = "ExternalId", default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Remote modification stamp as of the last sync
    #[serde(
        rename = "LastModifiedDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub remote_last_modified: Option<Timestamp>,
    #[serde(rename = "__local__", default)]
    pub local: bool,
    #[serde(rename = "__locally_created__", default)]
    pub locally_created: bool,
    #[serde(rename = "__locally_updated__", default)]
    pub locally_updated: bool,
    #[serde(rename = "__locally_deleted__", default)]
    pub locally_deleted: bool,
}

impl RecordMeta {
    /// Metadata for a brand-new record with a freshly minted external id.
    pub fn new() -> Self {
        Self {
            external_id: Some(uuid::Uuid::new_v4().to_string()),
            ..Self::default()
        }
    }

    /// Check if record is active (not a tombstone).
    pub fn is_active(&self) -> bool {
        !self.locally_deleted
    }

    /// The type tag, if one has been set.
    pub fn object_type(&self) -> Option<&str> {
        self.attributes.as_ref().map(|a| a.object_type.as_str())
    }

    pub fn set_object_type(&mut self, object_type: impl Into<String>) {
        self.attributes = Some(Attributes {
            object_type: object_type.into(),
        });
    }

    pub fn mark_created(&mut self) {
        self.local = true;
        self.locally_created = true;
    }

    pub fn mark_updated(&mut self) {
        self.local = true;
        self.locally_updated = true;
    }

    /// Mark record as deleted (tombstone).
    pub fn mark_deleted(&mut self) {
        self.local = true;
        self.locally_deleted = true;
    }

    /// Clear every dirty flag after the remote source accepted the change.
    pub fn mark_synced(&mut self) {
        self.local = false;
        self.locally_created = false;
        self.locally_updated = false;
        self.locally_deleted = false;
    }
}

/// A typed business object that can cross the row boundary.
pub trait Entity: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static {
    fn meta(&self) -> &RecordMeta;

    fn meta_mut(&mut self) -> &mut RecordMeta;

    /// Decode a storage row.
    fn from_row(row: Row) -> Result<Self> {
        serde_json::from_value(Value::Object(row)).map_err(|e| Error::Decode(e.to_string()))
    }

    /// Encode into a storage row.
    fn to_row(&self) -> Result<Row> {
        match serde_json::to_value(self) {
            Ok(Value::Object(row)) => Ok(row),
            Ok(other) => Err(Error::Decode(format!(
                "entity serialized to a non-object value: {other}"
            ))),
            Err(e) => Err(Error::Decode(e.to_string())),
        }
    }

    fn external_id(&self) -> Option<&str> {
        self.meta().external_id.as_deref()
    }
}

/// A schema-agnostic record: bookkeeping plus an untyped field bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(flatten)]
    pub meta: RecordMeta,
    #[serde(flatten)]
    pub fields: Row,
}

impl Record {
    /// Create a new record with a fresh external id and no fields.
    pub fn new() -> Self {
        Self {
            meta: RecordMeta::new(),
            fields: Row::new(),
        }
    }

    /// Builder-style method to set a field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }
}

impl Entity for Record {
    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }
}

/// Read a boolean flag out of a raw row, treating anything but `true` as false.
pub fn row_flag(row: &Row, key: &str) -> bool {
    row.get(key).and_then(Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_record_has_external_id() {
        let a = Record::new();
        let b = Record::new();

        assert!(a.external_id().is_some());
        assert_ne!(a.external_id(), b.external_id());
        assert!(!a.meta.local);
        assert!(a.meta.is_active());
    }

    #[test]
    fn default_record_is_empty() {
        let record = Record::default();
        assert_eq!(record.external_id(), None);
        assert!(record.fields.is_empty());
    }

    #[test]
    fn dirty_flags() {
        let mut record = Record::new();

        record.meta.mark_updated();
        assert!(record.meta.local);
        assert!(record.meta.locally_updated);

        record.meta.mark_deleted();
        assert!(record.meta.locally_deleted);
        assert!(!record.meta.is_active());

        record.meta.mark_synced();
        assert!(!record.meta.local);
        assert!(!record.meta.locally_updated);
        assert!(!record.meta.locally_deleted);
    }

    #[test]
    fn row_uses_reserved_keys() {
        let mut record = Record::new().with_field("Name", "Widget");
        record.meta.set_object_type("Product2");
        record.meta.mark_created();

        let row = record.to_row().unwrap();
        assert_eq!(row[field::LOCAL], json!(true));
        assert_eq!(row[field::LOCALLY_CREATED], json!(true));
        assert_eq!(row[field::LOCALLY_DELETED], json!(false));
        assert_eq!(row[field::ATTRIBUTES], json!({"type": "Product2"}));
        assert_eq!(row["Name"], json!("Widget"));
        assert!(row.get(field::ENTRY_ID).is_none());
    }

    #[test]
    fn from_row_splits_meta_and_fields() {
        let row = json!({
            "_soupEntryId": 7,
            "Id": "a0B1",
            "ExternalId": "ext-1",
            "__local__": true,
            "__locally_updated__": true,
            "Name": "Widget",
            "Price": 9.5
        });
        let Value::Object(row) = row else { unreachable!() };

        let record = Record::from_row(row).unwrap();
        assert_eq!(record.meta.entry_id, Some(7));
        assert_eq!(record.meta.server_id.as_deref(), Some("a0B1"));
        assert_eq!(record.external_id(), Some("ext-1"));
        assert!(record.meta.locally_updated);
        assert!(!record.meta.locally_created);
        assert_eq!(record.get("Name"), Some(&json!("Widget")));
        assert_eq!(record.get("Price"), Some(&json!(9.5)));
        assert!(record.get("Id").is_none());
    }

    #[test]
    fn row_flag_reads_booleans_only() {
        let Value::Object(row) = json!({"a": true, "b": 1, "c": false}) else {
            unreachable!()
        };
        assert!(row_flag(&row, "a"));
        assert!(!row_flag(&row, "b"));
        assert!(!row_flag(&row, "c"));
        assert!(!row_flag(&row, "missing"));
    }
}
