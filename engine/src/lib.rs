//! # Storefront Engine
//!
//! A local-first record store for storefront applications.
//!
//! This crate keeps a typed local cache of server-defined business objects
//! (products, product options, quotes), tracks local edits as dirty state, and
//! reconciles that state with a remote source through named sync channels.
//!
//! ## Design Principles
//!
//! - **Local first**: Reads are answered from local storage, synchronously
//! - **Lazy**: Storage and sync channels are provisioned on first use
//! - **Explicit**: Stores are owned by a [`StoreRegistry`], no globals
//! - **Pluggable**: Storage, sync and remote are traits with in-memory
//!   implementations
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! Every entity carries [`RecordMeta`]:
//! - Storage-assigned entry id
//! - Server id and external id
//! - Type tag
//! - Dirty flags (`local`, `locally_created`, `locally_updated`, `locally_deleted`)
//!
//! Entities cross into storage as generic [`Row`]s through [`Entity`].
//!
//! ### Stores
//!
//! A [`Store`] is parameterized by an [`EntitySchema`] value. Writes go to
//! local storage first:
//! - [`Store::locally_create`] / [`Store::locally_update`] mark the record dirty
//! - [`Store::locally_delete`] leaves a tombstone
//! - [`Store::create`], [`Store::update`], [`Store::delete`] also sync up
//!
//! ### Sync
//!
//! A [`SyncEngine`] owns named channels (`syncDown_<object>`,
//! `syncUp_<object>`). [`SyncManager`] is the shipped engine and talks to a
//! [`RemoteSource`].
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use storefront_engine::{MemoryRemote, MemoryStorage, StoreRegistry, SyncManager, Product};
//!
//! let storage = Arc::new(MemoryStorage::new());
//! let remote = Arc::new(MemoryRemote::new());
//! let engine = Arc::new(SyncManager::new(storage.clone(), remote));
//!
//! let registry = StoreRegistry::new(storage, engine, 100);
//! registry.open().unwrap();
//!
//! let mut product = Product::new();
//! product.name = Some("Espresso machine".into());
//! let saved = registry.products().locally_create(product).unwrap();
//!
//! assert!(saved.meta.locally_created);
//! assert_eq!(registry.products().count(), 1);
//! ```
//!
//! ## Persistence
//!
//! Use [`MemoryStorage::export_snapshot`] and [`MemoryStorage::import_snapshot`]
//! with [`StorageSnapshot`]. Snapshots serialize to JSON with deterministic
//! ordering.

pub mod error;
pub mod manager;
pub mod memory;
pub mod models;
pub mod option_store;
pub mod query;
pub mod record;
pub mod registry;
pub mod remote;
pub mod schema;
pub mod snapshot;
pub mod storage;
pub mod store;
pub mod sync;

// Re-export main types at crate root
pub use error::Error;
pub use manager::SyncManager;
pub use memory::{Collection, MemoryStorage};
pub use models::{Product, ProductOption, Quote, QuoteStage};
pub use option_store::{ProductFamily, ProductOptionStore};
pub use query::{Order, Predicate, QuerySpec, DEFAULT_PAGE_SIZE};
pub use record::{Attributes, Entity, Record, RecordMeta, Row};
pub use registry::{ManagedStore, StoreRegistry};
pub use remote::{MemoryRemote, RemoteSource};
pub use schema::{EntitySchema, EntitySchemaBuilder, IndexSpec, IndexType};
pub use snapshot::{StorageSnapshot, SNAPSHOT_FORMAT_VERSION};
pub use storage::LocalStorage;
pub use store::{Channel, Readiness, Store, SyncPhase};
pub use sync::{
    MergeMode, SyncDownTarget, SyncEngine, SyncOptions, SyncState, SyncStatus, SyncType,
    SyncUpTarget,
};

/// Type aliases for clarity
pub type CollectionName = String;
pub type EntryId = u64;
/// Milliseconds since the Unix epoch
pub type Timestamp = i64;
