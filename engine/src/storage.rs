//! Local storage contract.
//!
//! The embedded document store a [`Store`](crate::Store) reads from and
//! writes to. Calls are synchronous and assumed cheap; implementations
//! serialize their own access.

use crate::{error::Result, query::QuerySpec, EntryId, IndexSpec, Row};

pub trait LocalStorage: Send + Sync {
    /// Whether a collection has been registered.
    fn collection_exists(&self, name: &str) -> bool;

    /// Register a collection with its index spec.
    fn register_collection(&self, name: &str, indexes: &[IndexSpec]) -> Result<()>;

    /// Insert or replace rows, keyed by entry id. Rows without an entry id
    /// are inserted and returned with the id storage assigned.
    fn upsert(&self, rows: Vec<Row>, collection: &str) -> Result<Vec<Row>>;

    /// Total number of matching rows, ignoring paging.
    fn count(&self, spec: &QuerySpec) -> Result<usize>;

    /// One page of matching rows.
    fn query(&self, spec: &QuerySpec, page_index: usize) -> Result<Vec<Row>>;

    /// Physically remove rows.
    fn remove(&self, collection: &str, entry_ids: &[EntryId]) -> Result<()>;

    /// Drop every collection. Used when the signed-in user changes.
    fn clear(&self);
}
