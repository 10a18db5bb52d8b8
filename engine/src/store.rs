//! Store - typed access to one entity type.
//!
//! A [`Store`] owns a single collection in local storage and the two sync
//! channels that move it to and from the remote source. Both resources are
//! provisioned lazily on first use, or eagerly through [`Store::open`], and
//! dropped back to [`Readiness::Unprovisioned`] by [`Store::reset`].
//!
//! Reads never fail: malformed queries and storage errors are logged and
//! degrade to an empty result. Writes and syncs return [`Result`].

use crate::{
    error::Result,
    query::{Order, QuerySpec},
    record::field,
    EntitySchema, Entity, Error, LocalStorage, MergeMode, SyncDownTarget, SyncEngine, SyncOptions,
    SyncUpTarget, DEFAULT_PAGE_SIZE,
};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Provisioning state of a lazily created resource.
///
/// Only `Ready` short-circuits provisioning. `Provisioning` is reported to
/// observers while a check-then-create runs; a concurrent caller that sees
/// it provisions again, which the exists-check turns into a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Readiness {
    Unprovisioned = 0,
    Provisioning = 1,
    Ready = 2,
}

#[derive(Debug)]
struct ReadinessFlag(AtomicU8);

impl ReadinessFlag {
    fn new() -> Self {
        Self(AtomicU8::new(Readiness::Unprovisioned as u8))
    }

    fn get(&self) -> Readiness {
        match self.0.load(Ordering::Acquire) {
            2 => Readiness::Ready,
            1 => Readiness::Provisioning,
            _ => Readiness::Unprovisioned,
        }
    }

    fn set(&self, readiness: Readiness) {
        self.0.store(readiness as u8, Ordering::Release);
    }
}

/// The two sync channels every store owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Down,
    Up,
}

/// Phase of the latest sync run on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SyncPhase {
    #[default]
    Idle = 0,
    Running = 1,
    Completed = 2,
    Failed = 3,
}

#[derive(Debug)]
struct PhaseCell(AtomicU8);

impl PhaseCell {
    fn new() -> Self {
        Self(AtomicU8::new(SyncPhase::Idle as u8))
    }

    fn get(&self) -> SyncPhase {
        match self.0.load(Ordering::Acquire) {
            1 => SyncPhase::Running,
            2 => SyncPhase::Completed,
            3 => SyncPhase::Failed,
            _ => SyncPhase::Idle,
        }
    }

    fn set(&self, phase: SyncPhase) {
        self.0.store(phase as u8, Ordering::Release);
    }
}

/// Typed access to the collection described by an [`EntitySchema`].
///
/// Two threads racing through first access may both run the provisioning
/// check; the second registration is a no-op because storage and the sync
/// engine are checked before anything is created.
pub struct Store<T: Entity> {
    schema: EntitySchema,
    storage: Arc<dyn LocalStorage>,
    sync_engine: Arc<dyn SyncEngine>,
    page_size: usize,
    storage_ready: ReadinessFlag,
    channels_ready: ReadinessFlag,
    down_phase: PhaseCell,
    up_phase: PhaseCell,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> std::fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("object_name", &self.schema.object_name)
            .field("page_size", &self.page_size)
            .field("storage", &self.storage_ready.get())
            .field("channels", &self.channels_ready.get())
            .finish()
    }
}

impl<T: Entity> Store<T> {
    /// Create a store. Nothing is provisioned until first use.
    pub fn new(
        schema: EntitySchema,
        storage: Arc<dyn LocalStorage>,
        sync_engine: Arc<dyn SyncEngine>,
    ) -> Self {
        Self {
            schema,
            storage,
            sync_engine,
            page_size: DEFAULT_PAGE_SIZE,
            storage_ready: ReadinessFlag::new(),
            channels_ready: ReadinessFlag::new(),
            down_phase: PhaseCell::new(),
            up_phase: PhaseCell::new(),
            _entity: PhantomData,
        }
    }

    /// Page size for list queries and the sync-down limit. Zero is ignored.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        if page_size > 0 {
            self.page_size = page_size;
        }
        self
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    pub fn object_name(&self) -> &str {
        &self.schema.object_name
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn storage_readiness(&self) -> Readiness {
        self.storage_ready.get()
    }

    pub fn channel_readiness(&self) -> Readiness {
        self.channels_ready.get()
    }

    pub fn sync_phase(&self, channel: Channel) -> SyncPhase {
        self.phase(channel).get()
    }

    fn phase(&self, channel: Channel) -> &PhaseCell {
        match channel {
            Channel::Down => &self.down_phase,
            Channel::Up => &self.up_phase,
        }
    }

    fn channel_name(&self, channel: Channel) -> String {
        match channel {
            Channel::Down => self.schema.sync_down_name(),
            Channel::Up => self.schema.sync_up_name(),
        }
    }

    // ========== Provisioning ==========

    /// Register the collection unless storage already knows it.
    pub fn ensure_storage(&self) -> Result<()> {
        if self.storage_ready.get() == Readiness::Ready {
            return Ok(());
        }
        self.storage_ready.set(Readiness::Provisioning);

        let result = self.schema.validate().and_then(|_| {
            if self.storage.collection_exists(&self.schema.object_name) {
                Ok(())
            } else {
                self.storage
                    .register_collection(&self.schema.object_name, &self.schema.indexes)
            }
        });

        match result {
            Ok(()) => {
                self.storage_ready.set(Readiness::Ready);
                Ok(())
            }
            Err(e) => {
                self.storage_ready.set(Readiness::Unprovisioned);
                tracing::error!(collection = %self.schema.object_name, error = %e, "collection registration failed");
                Err(e)
            }
        }
    }

    /// Create whichever sync channel does not exist yet.
    pub fn ensure_sync_channels(&self) -> Result<()> {
        if self.channels_ready.get() == Readiness::Ready {
            return Ok(());
        }
        self.channels_ready.set(Readiness::Provisioning);

        match self.create_missing_channels() {
            Ok(()) => {
                self.channels_ready.set(Readiness::Ready);
                Ok(())
            }
            Err(e) => {
                self.channels_ready.set(Readiness::Unprovisioned);
                tracing::error!(collection = %self.schema.object_name, error = %e, "sync channel setup failed");
                Err(e)
            }
        }
    }

    fn create_missing_channels(&self) -> Result<()> {
        let name = &self.schema.object_name;

        let down = self.schema.sync_down_name();
        if !self.sync_engine.has_sync(&down) {
            let target = SyncDownTarget {
                object_name: name.clone(),
                fields: self.schema.read_fields.clone(),
                order_path: self.schema.order_path.clone(),
                limit: self.page_size,
            };
            self.sync_engine.create_sync_down(
                target,
                SyncOptions::sync_down(MergeMode::LeaveIfChanged),
                name,
                &down,
            )?;
        }

        let up = self.schema.sync_up_name();
        if !self.sync_engine.has_sync(&up) {
            let target = SyncUpTarget {
                create_fields: self.schema.create_fields.clone(),
                update_fields: self.schema.update_fields.clone(),
            };
            self.sync_engine.create_sync_up(
                target,
                SyncOptions::sync_up(self.schema.read_fields.clone(), MergeMode::Overwrite),
                name,
                &up,
            )?;
        }

        Ok(())
    }

    /// Provision storage, then sync channels.
    pub fn ensure_ready(&self) -> Result<()> {
        self.ensure_storage()?;
        self.ensure_sync_channels()
    }

    /// Eager form of [`Store::ensure_ready`].
    pub fn open(&self) -> Result<()> {
        self.ensure_ready()
    }

    /// Forget provisioning. The next access checks storage and the sync
    /// engine again.
    pub fn reset(&self) {
        self.storage_ready.set(Readiness::Unprovisioned);
        self.channels_ready.set(Readiness::Unprovisioned);
        self.down_phase.set(SyncPhase::Idle);
        self.up_phase.set(SyncPhase::Idle);
        tracing::debug!(collection = %self.schema.object_name, "store reset");
    }

    // ========== Local writes ==========

    fn timed<R>(&self, operation: &'static str, records: usize, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let result = f();
        tracing::debug!(
            operation,
            records,
            elapsed_ms = start.elapsed().as_millis() as u64,
            collection = %self.schema.object_name,
            "storage write"
        );
        result
    }

    fn upsert(&self, entry: &T, operation: &'static str) -> Result<T> {
        self.ensure_storage()?;
        let row = entry.to_row()?;
        let mut saved = self.timed(operation, 1, || {
            self.storage.upsert(vec![row], &self.schema.object_name)
        })?;
        let row = saved.pop().ok_or_else(|| {
            Error::StorageWrite(format!("upsert into {} returned no row", self.schema.object_name))
        })?;
        T::from_row(row)
    }

    fn tag(&self, entry: &mut T) {
        let meta = entry.meta_mut();
        if meta.object_type() != Some(self.schema.object_name.as_str()) {
            meta.set_object_type(self.schema.object_name.clone());
        }
    }

    /// Save a new record locally, flagged for creation on the next sync-up.
    pub fn locally_create(&self, mut entry: T) -> Result<T> {
        self.tag(&mut entry);
        let meta = entry.meta_mut();
        meta.mark_created();
        if meta.external_id.is_none() {
            meta.external_id = Some(uuid::Uuid::new_v4().to_string());
        }
        self.upsert(&entry, "locally_create")
    }

    pub fn locally_update(&self, mut entry: T) -> Result<T> {
        self.tag(&mut entry);
        entry.meta_mut().mark_updated();
        self.upsert(&entry, "locally_update")
    }

    /// Soft delete: the row stays as a tombstone until sync-up removes it.
    pub fn locally_delete(&self, mut entry: T) -> Result<()> {
        self.tag(&mut entry);
        entry.meta_mut().mark_deleted();
        self.upsert(&entry, "locally_delete").map(|_| ())
    }

    // ========== Remote writes ==========

    fn resolve(&self, external_id: Option<String>) -> Result<T> {
        self.record_for_external_id(external_id.as_deref())
            .ok_or(Error::RecordNotFound { external_id })
    }

    /// Create locally, push, and return the record as synced.
    pub async fn create(&self, entry: T) -> Result<T> {
        let created = self.locally_create(entry)?;
        self.sync_up().await?;
        self.resolve(created.external_id().map(str::to_string))
    }

    pub async fn update(&self, entry: T) -> Result<T> {
        let updated = self.locally_update(entry)?;
        self.sync_up().await?;
        self.resolve(updated.external_id().map(str::to_string))
    }

    pub async fn delete(&self, entry: T) -> Result<()> {
        self.locally_delete(entry)?;
        self.sync_up().await
    }

    /// Save the entry as-is, dirty flags untouched, then push.
    pub async fn sync(&self, mut entry: T) -> Result<()> {
        self.tag(&mut entry);
        self.upsert(&entry, "sync")?;
        self.sync_up().await
    }

    // ========== Sync ==========

    pub async fn sync_down(&self) -> Result<()> {
        self.resync(Channel::Down).await
    }

    pub async fn sync_up(&self) -> Result<()> {
        self.resync(Channel::Up).await
    }

    /// Re-run one of the store's channels and wait for it to finish.
    pub async fn resync(&self, channel: Channel) -> Result<()> {
        self.ensure_ready()?;

        let name = self.channel_name(channel);
        let phase = self.phase(channel);
        phase.set(SyncPhase::Running);

        let start = Instant::now();
        let outcome = self.sync_engine.resync_by_name(&name).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(state) if !state.has_failed() => {
                phase.set(SyncPhase::Completed);
                tracing::info!(
                    sync = %name,
                    records = state.total_size,
                    elapsed_ms,
                    "sync completed"
                );
                Ok(())
            }
            Ok(state) => {
                phase.set(SyncPhase::Failed);
                tracing::warn!(sync = %name, records = state.total_size, elapsed_ms, "sync failed");
                Err(Error::SyncFailed { sync_name: name })
            }
            Err(e) => {
                phase.set(SyncPhase::Failed);
                tracing::warn!(sync = %name, elapsed_ms, error = %e, "sync failed");
                Err(Error::SyncFailed { sync_name: name })
            }
        }
    }

    // ========== Reads ==========

    /// Number of live records.
    pub fn count(&self) -> usize {
        let result = self.ensure_storage().and_then(|_| {
            let spec = QuerySpec::list(&self.schema.object_name, &self.schema.order_path, 1)?;
            self.storage.count(&spec)
        });
        result.unwrap_or_else(|e| {
            tracing::error!(collection = %self.schema.object_name, error = %e, "count failed");
            0
        })
    }

    /// First page of live records in schema order.
    pub fn records(&self) -> Vec<T> {
        self.run(
            QuerySpec::list(&self.schema.object_name, &self.schema.order_path, self.page_size),
            0,
        )
    }

    /// The live record at `index` in schema order, or a default instance
    /// when `index` is out of range.
    pub fn record(&self, index: usize) -> T {
        self.run(
            QuerySpec::list(&self.schema.object_name, &self.schema.order_path, 1),
            index,
        )
        .into_iter()
        .next()
        .unwrap_or_default()
    }

    /// Look up a live record by external id.
    pub fn record_for_external_id(&self, external_id: Option<&str>) -> Option<T> {
        let external_id = external_id?;
        self.run(
            QuerySpec::exact(
                &self.schema.object_name,
                field::EXTERNAL_ID,
                external_id,
                &self.schema.order_path,
                Order::Descending,
                1,
            )
            .map(QuerySpec::excluding_deleted),
            0,
        )
        .into_iter()
        .next()
    }

    /// Every record, tombstones included, whose `path` equals `key`.
    pub fn find_exact(&self, path: &str, key: impl Into<Value>) -> Vec<T> {
        self.run(
            QuerySpec::exact(
                &self.schema.object_name,
                path,
                key,
                &self.schema.order_path,
                Order::Descending,
                self.page_size,
            ),
            0,
        )
    }

    /// Run an arbitrary query against this store's collection.
    pub fn query(&self, spec: &QuerySpec, page_index: usize) -> Vec<T> {
        self.run(Ok(spec.clone()), page_index)
    }

    pub(crate) fn run(&self, spec: Result<QuerySpec>, page_index: usize) -> Vec<T> {
        let rows = self
            .ensure_storage()
            .and_then(|_| spec)
            .and_then(|spec| self.storage.query(&spec, page_index));

        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(collection = %self.schema.object_name, error = %e, "query failed");
                return Vec::new();
            }
        };

        rows.into_iter()
            .filter_map(|row| match T::from_row(row) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::error!(collection = %self.schema.object_name, error = %e, "skipping undecodable row");
                    None
                }
            })
            .collect()
    }
}
