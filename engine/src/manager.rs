//! Sync manager - moves rows between local storage and the remote source.
//!
//! # Sync down
//!
//! 1. Fetch the rows the channel's target selects
//! 2. Match each against local storage by `Id`, then by `ExternalId`
//! 3. Dirty local rows are kept under [`MergeMode::LeaveIfChanged`]
//! 4. Everything else is upserted clean
//!
//! # Sync up
//!
//! Every row with `__local__ = true` is pushed: tombstones are deleted
//! remotely (or just dropped if they never reached the remote), created
//! rows are created with the create field list, updated rows are updated
//! with the update field list. A row that fails stays dirty and marks the
//! run as failed; the other rows are still attempted.

use crate::{
    error::Result,
    query::{Order, QuerySpec},
    record::{field, row_flag},
    EntryId, Error, LocalStorage, MergeMode, RemoteSource, Row, SyncDownTarget, SyncEngine,
    SyncOptions, SyncState, SyncStatus, SyncType, SyncUpTarget,
};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

/// Rows read per page while collecting dirty rows.
const DIRTY_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone)]
enum ChannelTarget {
    Down(SyncDownTarget),
    Up(SyncUpTarget),
}

#[derive(Debug, Clone)]
struct Channel {
    target: ChannelTarget,
    options: SyncOptions,
    collection: String,
    state: SyncState,
}

/// Outcome of pushing a single dirty row.
enum Pushed {
    Synced,
    Skipped,
}

/// The shipped [`SyncEngine`].
pub struct SyncManager {
    storage: Arc<dyn LocalStorage>,
    remote: Arc<dyn RemoteSource>,
    channels: DashMap<String, Channel>,
}

impl SyncManager {
    pub fn new(storage: Arc<dyn LocalStorage>, remote: Arc<dyn RemoteSource>) -> Self {
        Self {
            storage,
            remote,
            channels: DashMap::new(),
        }
    }

    /// Latest state of a channel.
    pub fn state(&self, name: &str) -> Option<SyncState> {
        self.channels.get(name).map(|c| c.state.clone())
    }

    /// Drop every channel, e.g. when the signed-in user changes.
    pub fn clear(&self) {
        self.channels.clear();
    }

    fn register(&self, name: &str, channel: Channel) -> Result<SyncState> {
        if name.is_empty() {
            return Err(Error::UnknownSync(String::new()));
        }
        let state = channel.state.clone();
        self.channels.insert(name.to_string(), channel);
        Ok(state)
    }

    fn set_status(&self, name: &str, status: SyncStatus, total_size: usize) -> Option<SyncState> {
        self.channels.get_mut(name).map(|mut channel| {
            channel.state.status = status;
            channel.state.total_size = total_size;
            channel.state.clone()
        })
    }

    fn find_one(&self, collection: &str, order_path: &str, path: &str, key: &Value) -> Result<Option<Row>> {
        let spec = QuerySpec::exact(collection, path, key.clone(), order_path, Order::Descending, 1)?;
        Ok(self.storage.query(&spec, 0)?.into_iter().next())
    }

    async fn sync_down(
        &self,
        target: &SyncDownTarget,
        options: &SyncOptions,
        collection: &str,
    ) -> Result<(usize, bool)> {
        let fetched = self.remote.fetch(target).await?;
        let total = fetched.len();

        let mut writes = Vec::with_capacity(total);
        for remote_row in fetched {
            let local = match remote_row.get(field::ID) {
                Some(id) => self.find_one(collection, &target.order_path, field::ID, id)?,
                None => None,
            };
            let local = match (local, remote_row.get(field::EXTERNAL_ID)) {
                (None, Some(ext)) => {
                    self.find_one(collection, &target.order_path, field::EXTERNAL_ID, ext)?
                }
                (local, _) => local,
            };

            let merged = match local {
                Some(local)
                    if row_flag(&local, field::LOCAL)
                        && options.merge_mode == MergeMode::LeaveIfChanged =>
                {
                    tracing::debug!(
                        collection,
                        id = ?remote_row.get(field::ID),
                        "leaving locally modified row"
                    );
                    continue;
                }
                Some(mut local) => {
                    local.extend(remote_row);
                    local
                }
                None => {
                    let mut row = remote_row;
                    row.insert(
                        field::ATTRIBUTES.to_string(),
                        serde_json::json!({ "type": target.object_name }),
                    );
                    // Rows created elsewhere need a local handle too
                    row.entry(field::EXTERNAL_ID.to_string())
                        .or_insert_with(|| Value::from(uuid::Uuid::new_v4().to_string()));
                    row
                }
            };
            writes.push(clean(merged));
        }

        if !writes.is_empty() {
            self.storage.upsert(writes, collection)?;
        }
        Ok((total, false))
    }

    fn dirty_rows(&self, collection: &str) -> Result<Vec<Row>> {
        let spec = QuerySpec::exact(
            collection,
            field::LOCAL,
            true,
            field::ENTRY_ID,
            Order::Ascending,
            DIRTY_PAGE_SIZE,
        )?;

        let mut rows = Vec::new();
        let mut page = 0;
        loop {
            let batch = self.storage.query(&spec, page)?;
            let done = batch.len() < DIRTY_PAGE_SIZE;
            rows.extend(batch);
            if done {
                return Ok(rows);
            }
            page += 1;
        }
    }

    async fn push_row(
        &self,
        target: &SyncUpTarget,
        options: &SyncOptions,
        collection: &str,
        object_name: &str,
        mut row: Row,
    ) -> Result<Pushed> {
        let entry_id = row.get(field::ENTRY_ID).and_then(Value::as_u64);
        let server_id = row
            .get(field::ID)
            .and_then(Value::as_str)
            .map(str::to_string);

        if row_flag(&row, field::LOCALLY_DELETED) {
            if let Some(id) = &server_id {
                self.remote.delete(object_name, id).await?;
            }
            remove(self.storage.as_ref(), collection, entry_id)?;
            return Ok(Pushed::Synced);
        }

        match server_id {
            None => {
                let id = self
                    .remote
                    .create(object_name, project(&row, &target.create_fields))
                    .await?;
                row.insert(field::ID.to_string(), Value::from(id.clone()));
                // Keep the id even when the stamp is unavailable
                match self.remote.last_modified(object_name, &id).await {
                    Ok(Some(stamp)) => {
                        row.insert(field::REMOTE_LAST_MODIFIED.to_string(), Value::from(stamp));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(collection, id = %id, error = %e, "no last-modified stamp after create");
                    }
                }
            }
            Some(id) => {
                if options.merge_mode == MergeMode::LeaveIfChanged {
                    let remote_stamp = self.remote.last_modified(object_name, &id).await?;
                    let local_stamp = row.get(field::REMOTE_LAST_MODIFIED).and_then(Value::as_i64);
                    if remote_stamp > local_stamp {
                        tracing::debug!(collection, id = %id, "remote changed since last sync, leaving");
                        return Ok(Pushed::Skipped);
                    }
                }
                self.remote
                    .update(object_name, &id, project(&row, &target.update_fields))
                    .await?;
                if let Some(stamp) = self.remote.last_modified(object_name, &id).await? {
                    row.insert(field::REMOTE_LAST_MODIFIED.to_string(), Value::from(stamp));
                }
            }
        }

        self.storage.upsert(vec![clean(row)], collection)?;
        Ok(Pushed::Synced)
    }

    async fn sync_up(
        &self,
        target: &SyncUpTarget,
        options: &SyncOptions,
        collection: &str,
    ) -> Result<(usize, bool)> {
        let dirty = self.dirty_rows(collection)?;
        let total = dirty.len();
        let mut failed = false;

        for row in dirty {
            let object_name = row
                .get(field::ATTRIBUTES)
                .and_then(|a| a.get("type"))
                .and_then(Value::as_str)
                .unwrap_or(collection)
                .to_string();

            match self
                .push_row(target, options, collection, &object_name, row)
                .await
            {
                Ok(Pushed::Synced) | Ok(Pushed::Skipped) => {}
                Err(e) => {
                    tracing::warn!(collection, error = %e, "failed to push row");
                    failed = true;
                }
            }
        }

        Ok((total, failed))
    }
}

/// Keep only the listed fields that are present on the row.
fn project(row: &Row, fields: &[String]) -> Row {
    fields
        .iter()
        .filter(|f| f.as_str() != field::ID)
        .filter_map(|f| row.get(f).map(|v| (f.clone(), v.clone())))
        .collect()
}

fn clean(mut row: Row) -> Row {
    for flag in [
        field::LOCAL,
        field::LOCALLY_CREATED,
        field::LOCALLY_UPDATED,
        field::LOCALLY_DELETED,
    ] {
        row.insert(flag.to_string(), Value::Bool(false));
    }
    row
}

fn remove(storage: &dyn LocalStorage, collection: &str, entry_id: Option<EntryId>) -> Result<()> {
    match entry_id {
        Some(id) => storage.remove(collection, &[id]),
        None => Ok(()),
    }
}

#[async_trait]
impl SyncEngine for SyncManager {
    fn has_sync(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    fn create_sync_down(
        &self,
        target: SyncDownTarget,
        options: SyncOptions,
        collection: &str,
        name: &str,
    ) -> Result<SyncState> {
        self.register(
            name,
            Channel {
                target: ChannelTarget::Down(target),
                options,
                collection: collection.to_string(),
                state: SyncState::new(name, SyncType::Down, collection),
            },
        )
    }

    fn create_sync_up(
        &self,
        target: SyncUpTarget,
        options: SyncOptions,
        collection: &str,
        name: &str,
    ) -> Result<SyncState> {
        self.register(
            name,
            Channel {
                target: ChannelTarget::Up(target),
                options,
                collection: collection.to_string(),
                state: SyncState::new(name, SyncType::Up, collection),
            },
        )
    }

    async fn resync_by_name(&self, name: &str) -> Result<SyncState> {
        // Clone the channel out so no map guard is held across an await
        let channel = self
            .channels
            .get(name)
            .map(|c| c.value().clone())
            .ok_or_else(|| Error::UnknownSync(name.to_string()))?;
        self.set_status(name, SyncStatus::Running, 0);

        let outcome = match &channel.target {
            ChannelTarget::Down(target) => {
                self.sync_down(target, &channel.options, &channel.collection)
                    .await
            }
            ChannelTarget::Up(target) => {
                self.sync_up(target, &channel.options, &channel.collection)
                    .await
            }
        };

        let (status, total) = match outcome {
            Ok((total, false)) => (SyncStatus::Done, total),
            Ok((total, true)) => (SyncStatus::Failed, total),
            Err(e) => {
                tracing::warn!(sync = name, error = %e, "sync aborted");
                (SyncStatus::Failed, 0)
            }
        };

        self.set_status(name, status, total)
            .ok_or_else(|| Error::UnknownSync(name.to_string()))
    }
}
