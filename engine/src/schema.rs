//! Schema descriptors.
//!
//! An [`EntitySchema`] describes one server-defined object: where it lives in
//! local storage, which paths are indexed, how it is ordered, and which
//! fields travel to the remote source on create, update and read.

use crate::{error::Result, record::field, CollectionName, Error};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Index types supported by local storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    String,
    Integer,
    Floating,
    /// Indexed through the JSON1 extension, no dedicated column
    Json1,
    FullText,
}

impl std::fmt::Display for IndexType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexType::String => write!(f, "string"),
            IndexType::Integer => write!(f, "integer"),
            IndexType::Floating => write!(f, "floating"),
            IndexType::Json1 => write!(f, "json1"),
            IndexType::FullText => write!(f, "full_text"),
        }
    }
}

/// A queryable path in a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSpec {
    pub path: String,
    #[serde(rename = "type")]
    pub index_type: IndexType,
}

impl IndexSpec {
    pub fn new(path: impl Into<String>, index_type: IndexType) -> Self {
        Self {
            path: path.into(),
            index_type,
        }
    }

    pub fn string(path: impl Into<String>) -> Self {
        Self::new(path, IndexType::String)
    }

    pub fn integer(path: impl Into<String>) -> Self {
        Self::new(path, IndexType::Integer)
    }

    pub fn floating(path: impl Into<String>) -> Self {
        Self::new(path, IndexType::Floating)
    }
}

/// Indexes every record carries, whatever its type.
pub fn base_indexes() -> Vec<IndexSpec> {
    vec![
        IndexSpec::string(field::ID),
        IndexSpec::string(field::EXTERNAL_ID),
        IndexSpec::string(field::LOCAL),
        IndexSpec::string(field::LOCALLY_CREATED),
        IndexSpec::string(field::LOCALLY_UPDATED),
        IndexSpec::string(field::LOCALLY_DELETED),
    ]
}

/// Field lists every record exchanges with the remote source.
pub fn base_read_fields() -> Vec<String> {
    vec![field::ID.to_string(), field::EXTERNAL_ID.to_string()]
}

/// Static metadata for one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySchema {
    /// Storage namespace and sync-channel suffix
    pub object_name: CollectionName,
    pub indexes: Vec<IndexSpec>,
    pub create_fields: Vec<String>,
    pub update_fields: Vec<String>,
    pub read_fields: Vec<String>,
    /// Default sort key for listing
    pub order_path: String,
}

impl EntitySchema {
    /// Start building a schema for `object_name` with the base indexes.
    pub fn builder(object_name: impl Into<CollectionName>) -> EntitySchemaBuilder {
        EntitySchemaBuilder {
            schema: EntitySchema {
                object_name: object_name.into(),
                indexes: base_indexes(),
                create_fields: vec![field::EXTERNAL_ID.to_string()],
                update_fields: Vec::new(),
                read_fields: base_read_fields(),
                order_path: field::EXTERNAL_ID.to_string(),
            },
        }
    }

    /// Name of the sync-down channel for this type.
    pub fn sync_down_name(&self) -> String {
        format!("syncDown_{}", self.object_name)
    }

    /// Name of the sync-up channel for this type.
    pub fn sync_up_name(&self) -> String {
        format!("syncUp_{}", self.object_name)
    }

    pub fn is_indexed(&self, path: &str) -> bool {
        self.indexes.iter().any(|i| i.path == path)
    }

    /// Check the descriptor is internally consistent.
    pub fn validate(&self) -> Result<()> {
        if self.object_name.is_empty() {
            return Err(Error::SchemaRegistration {
                collection: self.object_name.clone(),
                reason: "object name must not be empty".into(),
            });
        }

        let mut seen = HashSet::new();
        for index in &self.indexes {
            if !seen.insert(index.path.as_str()) {
                return Err(Error::SchemaRegistration {
                    collection: self.object_name.clone(),
                    reason: format!("duplicate index path '{}'", index.path),
                });
            }
        }

        if !self.is_indexed(&self.order_path) {
            return Err(Error::SchemaRegistration {
                collection: self.object_name.clone(),
                reason: format!("order path '{}' is not indexed", self.order_path),
            });
        }

        Ok(())
    }
}

/// Builder for [`EntitySchema`].
#[derive(Debug, Clone)]
pub struct EntitySchemaBuilder {
    schema: EntitySchema,
}

impl EntitySchemaBuilder {
    pub fn index(mut self, index: IndexSpec) -> Self {
        self.schema.indexes.push(index);
        self
    }

    pub fn create_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schema
            .create_fields
            .extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn update_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schema
            .update_fields
            .extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn read_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schema
            .read_fields
            .extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn order_path(mut self, path: impl Into<String>) -> Self {
        self.schema.order_path = path.into();
        self
    }

    /// Finish without validation; [`EntitySchema::validate`] runs at registration.
    pub fn build(self) -> EntitySchema {
        self.schema
    }
}
