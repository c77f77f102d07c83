//! # Larder Store
//!
//! The state half of Larder: the normalized entity cache, generation-tagged
//! async resources, and the debounced persistence adapter with its storage
//! backends.
//!
//! ## Key Types
//!
//! - [`EntityCache`] - Normalized records keyed by id; the single source of truth
//! - [`Resource`] - A remote fetch as an observable [`LoadState`]
//! - [`Persistence`] - Debounced save/load against a [`KeyValueStorage`]
//! - [`PersistedSlice`] - A value with a "loaded" guard against premature saves
//! - [`MemoryStorage`] / [`SqliteStorage`] - Storage backends
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use larder_store::{MemoryStorage, Persistence, PersistConfig};
//!
//! async fn example() {
//!     let storage = Arc::new(MemoryStorage::new());
//!     let persistence = Persistence::new(storage, PersistConfig::default());
//!
//!     // Bursts of saves collapse into one write after the quiet period.
//!     persistence.save("drafts", &vec!["a", "b"]);
//!     persistence.save("drafts", &vec!["a", "b", "c"]);
//!
//!     tokio::time::sleep(Duration::from_millis(600)).await;
//!     let drafts: Option<Vec<String>> = persistence.load("drafts").await;
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **No lock across await**: every critical section is synchronous, so a
//!   cache write is visible to all readers as soon as it returns
//! - **Coalesced fetches**: at most one fetch per id is in flight
//! - **Last writer wins**: superseded resource results are discarded by generation
//! - **Failures stay local**: persistence errors are logged, never propagated

pub mod cache;
pub mod error;
pub mod memory;
pub mod migration;
pub mod persist;
pub mod resource;
pub mod sqlite;
pub mod storage;

pub use cache::{CacheConfig, CacheListener, EntityCache, EntityFetcher, Write};
pub use error::{Result, StoreError};
pub use memory::MemoryStorage;
pub use persist::{PersistConfig, PersistedSlice, Persistence};
pub use resource::{Generation, LoadState, Resource};
pub use sqlite::SqliteStorage;
pub use storage::KeyValueStorage;
