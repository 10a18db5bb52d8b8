//! Store registry.
//!
//! The registry owns one store per storefront entity and is the only place
//! the application talks to at launch and at session end.

use crate::{
    error::Result,
    models::{Product, Quote},
    option_store::ProductOptionStore,
    store::Store,
    Entity, LocalStorage, SyncEngine,
};
use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::Arc;

/// The operations the registry drives on every store, whatever its entity.
#[async_trait]
pub trait ManagedStore: Send + Sync {
    fn object_name(&self) -> &str;

    fn ensure_ready(&self) -> Result<()>;

    fn reset(&self);

    async fn sync_down(&self) -> Result<()>;

    async fn sync_up(&self) -> Result<()>;
}

#[async_trait]
impl<T: Entity> ManagedStore for Store<T> {
    fn object_name(&self) -> &str {
        Store::object_name(self)
    }

    fn ensure_ready(&self) -> Result<()> {
        Store::ensure_ready(self)
    }

    fn reset(&self) {
        Store::reset(self)
    }

    async fn sync_down(&self) -> Result<()> {
        Store::sync_down(self).await
    }

    async fn sync_up(&self) -> Result<()> {
        Store::sync_up(self).await
    }
}

#[async_trait]
impl ManagedStore for ProductOptionStore {
    fn object_name(&self) -> &str {
        self.store().object_name()
    }

    fn ensure_ready(&self) -> Result<()> {
        self.store().ensure_ready()
    }

    fn reset(&self) {
        self.store().reset()
    }

    async fn sync_down(&self) -> Result<()> {
        self.store().sync_down().await
    }

    async fn sync_up(&self) -> Result<()> {
        self.store().sync_up().await
    }
}

/// Owns the product, product option and quote stores.
pub struct StoreRegistry {
    storage: Arc<dyn LocalStorage>,
    sync_engine: Arc<dyn SyncEngine>,
    products: Store<Product>,
    product_options: ProductOptionStore,
    quotes: Store<Quote>,
}

impl StoreRegistry {
    pub fn new(
        storage: Arc<dyn LocalStorage>,
        sync_engine: Arc<dyn SyncEngine>,
        page_size: usize,
    ) -> Self {
        Self {
            products: Store::new(Product::schema(), storage.clone(), sync_engine.clone())
                .with_page_size(page_size),
            product_options: ProductOptionStore::new(storage.clone(), sync_engine.clone())
                .with_page_size(page_size),
            quotes: Store::new(Quote::schema(), storage.clone(), sync_engine.clone())
                .with_page_size(page_size),
            storage,
            sync_engine,
        }
    }

    pub fn products(&self) -> &Store<Product> {
        &self.products
    }

    pub fn product_options(&self) -> &ProductOptionStore {
        &self.product_options
    }

    pub fn quotes(&self) -> &Store<Quote> {
        &self.quotes
    }

    pub fn storage(&self) -> &Arc<dyn LocalStorage> {
        &self.storage
    }

    pub fn sync_engine(&self) -> &Arc<dyn SyncEngine> {
        &self.sync_engine
    }

    /// Every store, in launch order.
    pub fn stores(&self) -> [&dyn ManagedStore; 3] {
        [&self.products, &self.product_options, &self.quotes]
    }

    /// Provision every store. Stops at the first failure.
    pub fn open(&self) -> Result<()> {
        for store in self.stores() {
            store.ensure_ready()?;
        }
        tracing::info!(stores = self.stores().len(), "stores opened");
        Ok(())
    }

    /// Sync every store down concurrently.
    ///
    /// Fails as soon as one store fails. Stores that already finished keep
    /// what they pulled.
    pub async fn begin_sync_down(&self) -> Result<()> {
        let result = try_join_all(self.stores().into_iter().map(|s| s.sync_down())).await;
        match &result {
            Ok(_) => tracing::info!("initial sync down completed"),
            Err(e) => tracing::error!(error = %e, "initial sync down failed"),
        }
        result.map(|_| ())
    }

    /// Push every store's local changes, one store after another.
    ///
    /// Every store is attempted; the first failure is returned.
    pub async fn sync_up_all(&self) -> Result<()> {
        let mut first_error = None;
        for store in self.stores() {
            if let Err(e) = store.sync_up().await {
                tracing::warn!(object = store.object_name(), error = %e, "sync up failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Forget all provisioning so the next user starts from scratch.
    pub fn on_session_end(&self) {
        for store in self.stores() {
            store.reset();
        }
        tracing::info!("session ended, stores reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{store::Readiness, MemoryRemote, MemoryStorage, ProductOption, Row, SyncManager};
    use serde_json::{json, Value};

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn registry() -> (StoreRegistry, Arc<MemoryStorage>, Arc<MemoryRemote>) {
        let storage = Arc::new(MemoryStorage::new());
        let remote = Arc::new(MemoryRemote::new());
        let engine = Arc::new(SyncManager::new(storage.clone(), remote.clone()));
        (StoreRegistry::new(storage.clone(), engine, 50), storage, remote)
    }

    #[test]
    fn open_provisions_every_store() {
        let (registry, storage, _) = registry();
        registry.open().unwrap();

        for name in [
            Product::OBJECT_NAME,
            ProductOption::OBJECT_NAME,
            Quote::OBJECT_NAME,
        ] {
            assert!(storage.collection_exists(name), "missing {name}");
        }
        assert_eq!(registry.products().page_size(), 50);
        assert_eq!(registry.quotes().channel_readiness(), Readiness::Ready);
    }

    #[test]
    fn session_end_resets_every_store() {
        let (registry, _, _) = registry();
        registry.open().unwrap();
        registry.on_session_end();

        for store in registry.stores() {
            assert!(!store.object_name().is_empty());
        }
        assert_eq!(registry.products().storage_readiness(), Readiness::Unprovisioned);
        assert_eq!(
            registry.product_options().storage_readiness(),
            Readiness::Unprovisioned
        );
        assert_eq!(registry.quotes().channel_readiness(), Readiness::Unprovisioned);
    }

    #[tokio::test]
    async fn sync_down_fans_out() {
        let (registry, _, remote) = registry();
        remote.seed(
            Product::OBJECT_NAME,
            vec![row(json!({"Name": "Widget"}))],
        );
        remote.seed(
            ProductOption::OBJECT_NAME,
            vec![row(json!({"SBQQ__Number__c": 1}))],
        );

        registry.begin_sync_down().await.unwrap();
        assert_eq!(registry.products().count(), 1);
        assert_eq!(registry.product_options().count(), 1);
        assert_eq!(registry.quotes().count(), 0);
    }

    #[tokio::test]
    async fn sync_down_failure_rejects_join() {
        let (registry, _, remote) = registry();
        remote.seed(
            Product::OBJECT_NAME,
            vec![row(json!({"Name": "Widget"}))],
        );
        remote.fail(Quote::OBJECT_NAME);

        let result = registry.begin_sync_down().await;
        assert!(matches!(result, Err(crate::Error::SyncFailed { .. })));
        // Products synced before the failure are kept
        assert_eq!(registry.products().count(), 1);
    }

    #[tokio::test]
    async fn sync_up_all_attempts_every_store() {
        let (registry, _, remote) = registry();
        remote.fail(Product::OBJECT_NAME);

        let mut product = Product::new();
        product.name = Some("Offline".into());
        registry.products().locally_create(product).unwrap();
        let mut quote = Quote::new();
        quote.key = Some("Q-7".into());
        registry.quotes().locally_create(quote).unwrap();

        let result = registry.sync_up_all().await;
        assert!(matches!(result, Err(crate::Error::SyncFailed { .. })));
        // Quotes come after products and still get pushed
        assert_eq!(remote.len(Quote::OBJECT_NAME), 1);
        assert!(registry.products().record(0).meta.local);
    }
}
