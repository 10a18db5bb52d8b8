//! Error types for the storefront engine.

use crate::CollectionName;
use thiserror::Error;

/// All possible errors from the storefront engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Provisioning errors
    #[error("failed to register collection '{collection}': {reason}")]
    SchemaRegistration {
        collection: CollectionName,
        reason: String,
    },

    #[error("collection not found: {0}")]
    UnknownCollection(CollectionName),

    // Query errors
    #[error("invalid query: {0}")]
    QueryConstruction(String),

    #[error("storage read failed: {0}")]
    StorageRead(String),

    #[error("storage write failed: {0}")]
    StorageWrite(String),

    #[error("could not decode row: {0}")]
    Decode(String),

    // Sync errors
    #[error("sync {sync_name} failed")]
    SyncFailed { sync_name: String },

    #[error("sync not found: {0}")]
    UnknownSync(String),

    #[error("remote source error: {0}")]
    Remote(String),

    #[error("record not found for external id {external_id:?}")]
    RecordNotFound { external_id: Option<String> },

    // State errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
