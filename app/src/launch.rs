//! Application launch and session lifecycle.
//!
//! Launch restores the local cache from disk, provisions every store and
//! kicks off the initial sync down. A failed sync down leaves the app
//! running on whatever the cache already had.

use crate::config::Config;
use crate::error::Result;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use storefront_engine::{
    LocalStorage, MemoryRemote, MemoryStorage, Row, StorageSnapshot, StoreRegistry, SyncManager,
};

/// Remote objects keyed by object name.
pub type Fixture = BTreeMap<String, Vec<Row>>;

/// Restore local storage from a snapshot file, or start empty if there is none.
pub async fn load_storage(path: &Path) -> Result<MemoryStorage> {
    if !tokio::fs::try_exists(path).await? {
        tracing::info!(path = %path.display(), "no local cache, starting empty");
        return Ok(MemoryStorage::new());
    }

    let json = tokio::fs::read_to_string(path).await?;
    let snapshot = StorageSnapshot::from_json(&json)?;
    tracing::info!(
        path = %path.display(),
        rows = snapshot.row_count(),
        dirty = snapshot.dirty_row_count(),
        "local cache restored"
    );
    Ok(MemoryStorage::from_snapshot(snapshot)?)
}

/// Write local storage to a snapshot file.
pub async fn save_storage(storage: &MemoryStorage, path: &Path) -> Result<()> {
    let snapshot = storage.export_snapshot();
    let json = snapshot.to_json_pretty()?;
    tokio::fs::write(path, json).await?;
    tracing::info!(path = %path.display(), rows = snapshot.row_count(), "local cache saved");
    Ok(())
}

/// Build the in-memory remote, seeded from a fixture file when one is given.
pub async fn load_remote(fixture: Option<&Path>) -> Result<MemoryRemote> {
    let remote = MemoryRemote::new();
    let Some(path) = fixture else {
        return Ok(remote);
    };

    let json = tokio::fs::read_to_string(path).await?;
    let fixture: Fixture = serde_json::from_str(&json)?;
    for (object_name, rows) in fixture {
        let seeded = remote.seed(&object_name, rows);
        tracing::debug!(object = %object_name, rows = seeded.len(), "remote seeded");
    }
    Ok(remote)
}

/// A running application: storage, sync engine and stores.
pub struct App {
    config: Config,
    storage: Arc<MemoryStorage>,
    engine: Arc<SyncManager>,
    registry: StoreRegistry,
}

impl App {
    /// Restore state, open every store and run the initial sync down.
    pub async fn launch(config: Config) -> Result<Self> {
        let storage = Arc::new(load_storage(&config.data_path).await?);
        let remote = Arc::new(load_remote(config.remote_fixture.as_deref()).await?);
        let engine = Arc::new(SyncManager::new(storage.clone(), remote));
        let registry = StoreRegistry::new(storage.clone(), engine.clone(), config.page_size);

        registry.open()?;
        if let Err(e) = registry.begin_sync_down().await {
            tracing::warn!(error = %e, "continuing with cached data");
        }

        Ok(Self {
            config,
            storage,
            engine,
            registry,
        })
    }

    pub fn registry(&self) -> &StoreRegistry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Sign the current user out: reset every store and drop cached data.
    pub async fn end_session(&self) -> Result<()> {
        self.registry.on_session_end();
        self.storage.clear();
        self.engine.clear();
        if tokio::fs::try_exists(&self.config.data_path).await? {
            tokio::fs::remove_file(&self.config.data_path).await?;
        }
        Ok(())
    }

    /// Push pending changes, then persist the cache.
    pub async fn shutdown(&self) -> Result<()> {
        if let Err(e) = self.registry.sync_up_all().await {
            tracing::warn!(error = %e, "pending changes kept for the next run");
        }
        save_storage(&self.storage, &self.config.data_path).await
    }
}
