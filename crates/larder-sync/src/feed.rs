//! Cursor-paginated feeds of cook ids.
//!
//! A feed holds ids only; the records live in the shared [`EntityCache`].
//! Each page's records are ingested into the cache as they arrive, so a like
//! or edit applied to the cache is visible through every feed at once.
//!
//! Rules:
//! - At most one page request is in flight per feed.
//! - Appending never introduces a duplicate id.
//! - Only an empty page ends the feed; a short page keeps `has_more`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use larder_core::{Cook, CookId, LarderError, Result, StateError, Username};
use larder_store::{CacheListener, EntityCache, LoadState, Resource};

/// Identifies one feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeedKey {
    /// The session user's home feed.
    Home,
    /// One user's cooks.
    User(Username),
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedKey::Home => write!(f, "home"),
            FeedKey::User(username) => write!(f, "user:{}", username),
        }
    }
}

/// Where a feed's pages come from. Pages are numbered from 1.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, page: u32) -> Result<Vec<Cook>>;
}

/// Result of one successful page load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageOutcome {
    /// Page number that was requested.
    pub page: u32,
    /// Records in the response.
    pub received: usize,
    /// Ids that were new to the feed.
    pub added: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadKind {
    Initial,
    Next,
}

struct FeedState {
    ids: Vec<CookId>,
    cursor: u32,
    has_more: bool,
    loading_initial: bool,
    loading_next: bool,
    /// Positions of ids removed from the cache, for restoring a
    /// rolled-back delete in place.
    removed: HashMap<CookId, usize>,
}

/// The id list of one feed. Subscribed to cache removals.
struct FeedIndex {
    feed: String,
    state: Mutex<FeedState>,
}

impl FeedIndex {
    fn new(feed: String) -> Self {
        Self {
            feed,
            state: Mutex::new(FeedState {
                ids: Vec::new(),
                cursor: 1,
                has_more: true,
                loading_initial: false,
                loading_next: false,
                removed: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the feed's single request slot.
    fn start(&self, kind: LoadKind) -> Result<LoadingGuard<'_>> {
        let mut state = self.lock();
        if state.loading_initial || state.loading_next {
            return Err(StateError::FeedBusy {
                feed: self.feed.clone(),
            }
            .into());
        }
        if kind == LoadKind::Next && !state.has_more {
            return Err(StateError::FeedExhausted {
                feed: self.feed.clone(),
            }
            .into());
        }
        match kind {
            LoadKind::Initial => state.loading_initial = true,
            LoadKind::Next => state.loading_next = true,
        }
        Ok(LoadingGuard { index: self, kind })
    }
}

impl CacheListener<CookId> for FeedIndex {
    fn on_removed(&self, id: &CookId) {
        let mut state = self.lock();
        if let Some(position) = state.ids.iter().position(|existing| existing == id) {
            state.ids.remove(position);
            state.removed.insert(id.clone(), position);
            tracing::debug!(feed = %self.feed, %id, position, "dropped removed cook");
        }
    }

    fn on_restored(&self, id: &CookId) {
        let mut state = self.lock();
        let Some(position) = state.removed.remove(id) else {
            return;
        };
        if state.ids.contains(id) {
            return;
        }
        let position = position.min(state.ids.len());
        state.ids.insert(position, id.clone());
        tracing::debug!(feed = %self.feed, %id, position, "restored cook");
    }

    fn on_forgotten(&self, id: &CookId) {
        self.lock().removed.remove(id);
    }
}

/// Clears the loading flag it was created for, on every exit path.
struct LoadingGuard<'a> {
    index: &'a FeedIndex,
    kind: LoadKind,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.index.lock();
        match self.kind {
            LoadKind::Initial => state.loading_initial = false,
            LoadKind::Next => state.loading_next = false,
        }
    }
}

/// One paginated feed.
pub struct FeedController {
    key: FeedKey,
    source: Arc<dyn PageSource>,
    cache: Arc<EntityCache<Cook>>,
    index: Arc<FeedIndex>,
    /// Tracks the initial load; the value is the number of ids after it.
    status: Resource<usize>,
}

impl FeedController {
    pub fn new(key: FeedKey, source: Arc<dyn PageSource>, cache: Arc<EntityCache<Cook>>) -> Self {
        let index = Arc::new(FeedIndex::new(key.to_string()));
        cache.subscribe(&index);
        Self {
            status: Resource::new(format!("feed:{}", key)),
            key,
            source,
            cache,
            index,
        }
    }

    /// Load page 1, replacing the current id list.
    ///
    /// Also the retry entry point after a failed initial load.
    pub async fn load_first_page(&self) -> Result<PageOutcome> {
        let _loading = self.index.start(LoadKind::Initial)?;
        let generation = self.status.begin();
        tracing::debug!(feed = %self.key, "loading first page");

        let cooks = match self.source.fetch_page(1).await {
            Ok(cooks) => cooks,
            Err(error) => {
                tracing::warn!(feed = %self.key, %error, "first page failed");
                self.status.resolve(generation, Err(error.clone()));
                return Err(error);
            }
        };

        let received = cooks.len();
        let ids = self.ingest(cooks);
        let outcome = {
            let mut state = self.index.lock();
            let mut seen = HashSet::with_capacity(ids.len());
            state.ids = ids.into_iter().filter(|id| seen.insert(id.clone())).collect();
            state.cursor = 1;
            state.has_more = received > 0;
            state.removed.clear();
            PageOutcome {
                page: 1,
                received,
                added: state.ids.len(),
                has_more: state.has_more,
            }
        };

        self.status.resolve(generation, Ok(outcome.added));
        tracing::debug!(feed = %self.key, received, has_more = outcome.has_more, "first page loaded");
        Ok(outcome)
    }

    /// Load the page after the cursor and append its new ids.
    ///
    /// Fails with [`StateError`] without issuing a request when a load is
    /// already in flight or the feed is exhausted.
    pub async fn load_next_page(&self) -> Result<PageOutcome> {
        let _loading = self.index.start(LoadKind::Next)?;
        let page = self.index.lock().cursor + 1;
        tracing::debug!(feed = %self.key, page, "loading next page");

        let cooks = self.source.fetch_page(page).await.map_err(|error| {
            tracing::warn!(feed = %self.key, page, %error, "next page failed");
            error
        })?;

        let received = cooks.len();
        let ids = self.ingest(cooks);
        let mut state = self.index.lock();
        let before = state.ids.len();
        for id in ids {
            if !state.ids.contains(&id) {
                state.ids.push(id);
            }
        }
        state.cursor = page;
        state.has_more = received > 0;

        let outcome = PageOutcome {
            page,
            received,
            added: state.ids.len() - before,
            has_more: state.has_more,
        };
        tracing::debug!(
            feed = %self.key,
            page,
            received,
            added = outcome.added,
            has_more = outcome.has_more,
            "next page loaded"
        );
        Ok(outcome)
    }

    fn ingest(&self, cooks: Vec<Cook>) -> Vec<CookId> {
        cooks
            .into_iter()
            .map(|cook| {
                let id = cook.id.clone();
                self.cache.ingest(cook);
                id
            })
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Getters
    // ─────────────────────────────────────────────────────────────────────────

    pub fn key(&self) -> &FeedKey {
        &self.key
    }

    pub fn ids(&self) -> Vec<CookId> {
        self.index.lock().ids.clone()
    }

    /// Records for the current ids, read through the cache.
    pub fn cooks(&self) -> Vec<Cook> {
        self.ids()
            .iter()
            .filter_map(|id| self.cache.get(id))
            .collect()
    }

    /// Current page. Starts at 1 and only moves forward.
    pub fn cursor(&self) -> u32 {
        self.index.lock().cursor
    }

    pub fn has_more(&self) -> bool {
        self.index.lock().has_more
    }

    pub fn is_loading(&self) -> bool {
        let state = self.index.lock();
        state.loading_initial || state.loading_next
    }

    pub fn is_loading_initial(&self) -> bool {
        self.index.lock().loading_initial
    }

    pub fn is_loading_next(&self) -> bool {
        self.index.lock().loading_next
    }

    /// State of the initial load.
    pub fn status(&self) -> LoadState<usize> {
        self.status.state()
    }

    /// Error of the last initial load, if it failed.
    pub fn error(&self) -> Option<LarderError> {
        self.status.error()
    }
}

type SourceFactory = dyn Fn(&FeedKey) -> Arc<dyn PageSource> + Send + Sync;

/// Creates feeds on first use and hands out the same instance afterwards.
pub struct FeedRegistry {
    cache: Arc<EntityCache<Cook>>,
    sources: Box<SourceFactory>,
    feeds: Mutex<HashMap<FeedKey, Arc<FeedController>>>,
}

impl FeedRegistry {
    pub fn new<F>(cache: Arc<EntityCache<Cook>>, sources: F) -> Self
    where
        F: Fn(&FeedKey) -> Arc<dyn PageSource> + Send + Sync + 'static,
    {
        Self {
            cache,
            sources: Box::new(sources),
            feeds: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<FeedKey, Arc<FeedController>>> {
        self.feeds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The feed for `key`, created if needed.
    pub fn feed(&self, key: &FeedKey) -> Arc<FeedController> {
        let mut feeds = self.lock();
        if let Some(feed) = feeds.get(key) {
            return Arc::clone(feed);
        }
        let feed = Arc::new(FeedController::new(
            key.clone(),
            (self.sources)(key),
            Arc::clone(&self.cache),
        ));
        feeds.insert(key.clone(), Arc::clone(&feed));
        feed
    }

    /// The feed for `key`, only if it was already created.
    pub fn existing(&self, key: &FeedKey) -> Option<Arc<FeedController>> {
        self.lock().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<FeedKey> {
        let mut keys: Vec<FeedKey> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}
