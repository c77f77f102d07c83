//! The entity cache: normalized records keyed by id.
//!
//! Every other structure (feeds, search results, mutations) refers to cached
//! records by id, so one write here is visible to every consumer at once.
//!
//! Fetches are coalesced: concurrent `ensure_loaded` calls for the same id
//! attach to a single in-flight fetch and all observe its result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use larder_core::{Entity, ImagePreloader, Result};

/// Loads a full record from the remote API.
#[async_trait]
pub trait EntityFetcher<E: Entity>: Send + Sync {
    async fn fetch(&self, id: &E::Id) -> Result<E>;
}

/// Observer of cache removals.
///
/// Called synchronously, after the cache itself has been updated.
pub trait CacheListener<Id>: Send + Sync {
    /// `id` was removed from the cache.
    fn on_removed(&self, id: &Id);

    /// A previously removed `id` was put back (a rolled-back delete).
    fn on_restored(&self, _id: &Id) {}

    /// The removal of `id` is final; it will not be restored.
    fn on_forgotten(&self, _id: &Id) {}
}

/// A cache write.
#[derive(Debug, Clone)]
pub enum Write<E: Entity> {
    /// Shallow-merge the patch into the existing record.
    Merge(E::Patch),
    /// Replace the record wholesale and mark it fresh.
    Replace(E),
}

/// Configuration for an entity cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Age after which `ensure_loaded` refetches. `None` never expires.
    pub stale_after: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_after: Some(Duration::from_secs(300)),
        }
    }
}

struct Entry<E> {
    record: E,
    stored_at: Instant,
}

type InFlight<E> = Arc<OnceCell<Result<E>>>;

struct CacheInner<E: Entity> {
    records: HashMap<E::Id, Entry<E>>,
    in_flight: HashMap<E::Id, InFlight<E>>,
    fetches: u64,
}

/// Normalized store of one record type.
pub struct EntityCache<E: Entity> {
    inner: Mutex<CacheInner<E>>,
    listeners: Mutex<Vec<Weak<dyn CacheListener<E::Id>>>>,
    fetcher: Arc<dyn EntityFetcher<E>>,
    preloader: Arc<dyn ImagePreloader>,
    config: CacheConfig,
}

impl<E: Entity> EntityCache<E> {
    pub fn new(
        fetcher: Arc<dyn EntityFetcher<E>>,
        preloader: Arc<dyn ImagePreloader>,
        config: CacheConfig,
    ) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                records: HashMap::new(),
                in_flight: HashMap::new(),
                fetches: 0,
            }),
            listeners: Mutex::new(Vec::new()),
            fetcher,
            preloader,
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner<E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_fresh(&self, entry: &Entry<E>) -> bool {
        match self.config.stale_after {
            Some(max_age) => entry.stored_at.elapsed() < max_age,
            None => true,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// The cached record, if any. Never fetches.
    pub fn get(&self, id: &E::Id) -> Option<E> {
        self.lock().records.get(id).map(|entry| entry.record.clone())
    }

    pub fn contains(&self, id: &E::Id) -> bool {
        self.lock().records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a fetch for `id` is in flight.
    pub fn is_fetching(&self, id: &E::Id) -> bool {
        self.lock().in_flight.contains_key(id)
    }

    /// Number of fetches issued since creation.
    pub fn fetch_count(&self) -> u64 {
        self.lock().fetches
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Loading
    // ─────────────────────────────────────────────────────────────────────────

    /// Return the record, fetching it if absent or stale.
    ///
    /// Concurrent callers for the same id share one fetch.
    pub async fn ensure_loaded(&self, id: &E::Id) -> Result<E> {
        let cell = {
            let mut inner = self.lock();
            if let Some(entry) = inner.records.get(id) {
                if self.is_fresh(entry) {
                    return Ok(entry.record.clone());
                }
            }
            Arc::clone(
                inner
                    .in_flight
                    .entry(id.clone())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        let result = cell
            .get_or_init(|| self.fetch_into_cache(id, &cell))
            .await
            .clone();

        let mut inner = self.lock();
        if inner
            .in_flight
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(current, &cell))
        {
            inner.in_flight.remove(id);
        }
        result
    }

    async fn fetch_into_cache(&self, id: &E::Id, cell: &InFlight<E>) -> Result<E> {
        self.lock().fetches += 1;
        tracing::debug!(kind = E::KIND, %id, "fetching");

        match self.fetcher.fetch(id).await {
            Ok(record) => {
                // A remove() while the fetch was in flight detaches the cell.
                let still_wanted = self
                    .lock()
                    .in_flight
                    .get(id)
                    .is_some_and(|current| Arc::ptr_eq(current, cell));
                if still_wanted {
                    self.ingest(record.clone());
                } else {
                    tracing::debug!(kind = E::KIND, %id, "dropping fetch result for removed record");
                }
                Ok(record)
            }
            Err(error) => {
                tracing::warn!(kind = E::KIND, %id, %error, "fetch failed");
                Err(error)
            }
        }
    }

    /// Warm the cache in the background. Failures are only logged.
    pub fn preload(self: &Arc<Self>, id: &E::Id) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let id = id.clone();
        tokio::spawn(async move {
            if let Err(error) = cache.ensure_loaded(&id).await {
                tracing::warn!(kind = E::KIND, %id, %error, "preload failed");
            }
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Write to the record under `id`.
    ///
    /// Returns `false` if nothing was written: a merge into a missing record,
    /// or a replacement whose own id differs from `id`.
    pub fn save(&self, id: &E::Id, write: Write<E>) -> bool {
        match write {
            Write::Merge(patch) => self.merge(id, &patch),
            Write::Replace(record) => {
                if record.id() != id {
                    tracing::warn!(kind = E::KIND, %id, other = %record.id(), "replacement id mismatch");
                    return false;
                }
                self.put(record);
                true
            }
        }
    }

    /// Insert or replace a full record.
    pub fn put(&self, record: E) {
        let id = record.id().clone();
        self.lock().records.insert(
            id,
            Entry {
                record,
                stored_at: Instant::now(),
            },
        );
    }

    /// Insert a full record from the server and warm its images.
    pub fn ingest(&self, record: E) {
        let urls = record.image_urls();
        self.put(record);
        if !urls.is_empty() {
            self.preloader.preload(&urls);
        }
    }

    /// Shallow-merge `patch` into an existing record.
    pub fn merge(&self, id: &E::Id, patch: &E::Patch) -> bool {
        let mut inner = self.lock();
        match inner.records.get_mut(id) {
            Some(entry) => {
                entry.record.apply(patch);
                true
            }
            None => {
                tracing::debug!(kind = E::KIND, %id, "merge into missing record ignored");
                false
            }
        }
    }

    /// Compute a patch from the current record, apply it, and return the
    /// prior values of exactly the patched fields.
    ///
    /// Returns `None` if the record is missing or `make_patch` declines.
    pub fn patch_with<F>(&self, id: &E::Id, make_patch: F) -> Option<E::Patch>
    where
        F: FnOnce(&E) -> Option<E::Patch>,
    {
        let mut inner = self.lock();
        let entry = inner.records.get_mut(id)?;
        let patch = make_patch(&entry.record)?;
        let snapshot = entry.record.capture(&patch);
        entry.record.apply(&patch);
        Some(snapshot)
    }

    /// Delete a record and tell every listener to drop the id.
    pub fn remove(&self, id: &E::Id) -> Option<E> {
        let removed = {
            let mut inner = self.lock();
            inner.in_flight.remove(id);
            inner.records.remove(id).map(|entry| entry.record)
        };
        for listener in self.live_listeners() {
            listener.on_removed(id);
        }
        removed
    }

    /// Put a removed record back and tell listeners.
    pub fn restore(&self, record: E) {
        let id = record.id().clone();
        self.put(record);
        for listener in self.live_listeners() {
            listener.on_restored(&id);
        }
    }

    /// Confirm a removal, letting listeners drop what they kept for a restore.
    pub fn forget(&self, id: &E::Id) {
        for listener in self.live_listeners() {
            listener.on_forgotten(id);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Listeners
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a listener. Only a weak reference is kept.
    pub fn subscribe<L>(&self, listener: &Arc<L>)
    where
        L: CacheListener<E::Id> + 'static,
    {
        let weak: Weak<L> = Arc::downgrade(listener);
        let weak: Weak<dyn CacheListener<E::Id>> = weak;
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(weak);
    }

    fn live_listeners(&self) -> Vec<Arc<dyn CacheListener<E::Id>>> {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|weak| weak.strong_count() > 0);
        listeners.iter().filter_map(Weak::upgrade).collect()
    }
}
