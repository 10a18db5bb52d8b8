//! Sync engine contract.
//!
//! Sync channels are named, persistent configurations that move rows
//! between one local collection and the remote source. Stores create their
//! channels once and then only ever refer to them by name through
//! [`SyncEngine::resync_by_name`].

use crate::{error::Result, CollectionName};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What to do when local and remote copies of a record both changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeMode {
    /// Last write wins
    #[default]
    Overwrite,
    /// Keep the other side's change and skip this record
    LeaveIfChanged,
}

/// Direction of a sync channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncType {
    Down,
    Up,
}

/// Options attached to a sync channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOptions {
    pub merge_mode: MergeMode,
    /// Fields read back from the remote source after a push
    pub field_list: Vec<String>,
}

impl SyncOptions {
    pub fn sync_down(merge_mode: MergeMode) -> Self {
        Self {
            merge_mode,
            field_list: Vec::new(),
        }
    }

    pub fn sync_up(field_list: Vec<String>, merge_mode: MergeMode) -> Self {
        Self {
            merge_mode,
            field_list,
        }
    }
}

/// Which remote rows a sync-down channel fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDownTarget {
    pub object_name: String,
    pub fields: Vec<String>,
    pub order_path: String,
    pub limit: usize,
}

/// Which fields a sync-up channel pushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncUpTarget {
    pub create_fields: Vec<String>,
    pub update_fields: Vec<String>,
}

/// Terminal and intermediate states of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStatus {
    #[default]
    New,
    Running,
    Done,
    Failed,
}

/// Outcome of the latest run of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub name: String,
    pub sync_type: SyncType,
    pub collection: CollectionName,
    /// Records the run looked at
    pub total_size: usize,
    pub status: SyncStatus,
}

impl SyncState {
    pub fn new(name: impl Into<String>, sync_type: SyncType, collection: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sync_type,
            collection: collection.into(),
            total_size: 0,
            status: SyncStatus::New,
        }
    }

    pub fn has_failed(&self) -> bool {
        self.status == SyncStatus::Failed
    }

    pub fn is_done(&self) -> bool {
        self.status == SyncStatus::Done
    }
}

/// The asynchronous engine that owns sync channels.
#[async_trait]
pub trait SyncEngine: Send + Sync {
    /// Whether a channel with this name exists.
    fn has_sync(&self, name: &str) -> bool;

    /// Create a sync-down channel.
    fn create_sync_down(
        &self,
        target: SyncDownTarget,
        options: SyncOptions,
        collection: &str,
        name: &str,
    ) -> Result<SyncState>;

    /// Create a sync-up channel.
    fn create_sync_up(
        &self,
        target: SyncUpTarget,
        options: SyncOptions,
        collection: &str,
        name: &str,
    ) -> Result<SyncState>;

    /// Re-run a channel. Resolves once the run reached a terminal status.
    async fn resync_by_name(&self, name: &str) -> Result<SyncState>;
}
