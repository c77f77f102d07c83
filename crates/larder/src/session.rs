//! The session: one signed-in user's client-side state.
//!
//! The session owns the entity caches, feeds, in-flight mutations and the
//! persisted slices, and exposes the getters and actions the UI binds to.
//! It is constructed once at startup and passed to whoever needs it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;

use larder_core::wire;
use larder_core::{
    Cook, CookId, CookPatch, ImagePreloader, LarderError, LogNotifier, NoopPreloader, Notifier,
    PhotoRef, Result, UserProfile, UserSummary, Username,
};
use larder_store::{
    EntityCache, KeyValueStorage, LoadState, PersistedSlice, Persistence, Resource, SqliteStorage,
};
use larder_sync::{
    entity_key, paths, Action, ApiClient, CookFetcher, FeedController, FeedKey, FeedRegistry,
    HomeFeedSource, MutationCoordinator, PageOutcome, PageSource, ProfileFetcher, Reactor,
    UserCooksSource,
};

use crate::config::SessionConfig;
use crate::reactions;

/// Storage key of the last contacts sync time.
pub const CONTACTS_SYNCED_KEY: &str = "contacts_synced_at";
/// Storage key of unsaved notes drafts.
pub const DRAFTS_KEY: &str = "draft_notes";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Collaborators injected by the host application.
#[derive(Clone)]
pub struct Services {
    pub api: Arc<dyn ApiClient>,
    pub storage: Arc<dyn KeyValueStorage>,
    pub preloader: Arc<dyn ImagePreloader>,
    pub notifier: Arc<dyn Notifier>,
}

impl Services {
    /// Services with no image preloading and log-only notifications.
    pub fn new(api: Arc<dyn ApiClient>, storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            api,
            storage,
            preloader: Arc::new(NoopPreloader),
            notifier: Arc::new(LogNotifier),
        }
    }

    /// Services backed by a SQLite file at `path`.
    pub fn sqlite(api: Arc<dyn ApiClient>, path: impl AsRef<Path>) -> crate::Result<Self> {
        let storage = SqliteStorage::open(path)?;
        Ok(Self::new(api, Arc::new(storage)))
    }

    pub fn with_preloader(mut self, preloader: Arc<dyn ImagePreloader>) -> Self {
        self.preloader = preloader;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

/// Session-wide values the reactions derive from.
pub struct SessionState {
    following: Mutex<BTreeSet<Username>>,
    contacts_synced_at: PersistedSlice<Option<i64>>,
    drafts: PersistedSlice<BTreeMap<CookId, String>>,
}

impl SessionState {
    fn new(persistence: &Arc<Persistence>) -> Self {
        Self {
            following: Mutex::new(BTreeSet::new()),
            contacts_synced_at: PersistedSlice::new(
                Arc::clone(persistence),
                CONTACTS_SYNCED_KEY,
                None,
            ),
            drafts: PersistedSlice::new(Arc::clone(persistence), DRAFTS_KEY, BTreeMap::new()),
        }
    }

    pub fn following(&self) -> BTreeSet<Username> {
        lock(&self.following).clone()
    }

    pub fn is_following(&self, username: &Username) -> bool {
        lock(&self.following).contains(username)
    }

    /// Returns whether the set changed.
    fn set_following(&self, username: &Username, following: bool) -> bool {
        let mut set = lock(&self.following);
        if following {
            set.insert(username.clone())
        } else {
            set.remove(username)
        }
    }

    fn replace_following(&self, usernames: BTreeSet<Username>) {
        *lock(&self.following) = usernames;
    }

    pub fn contacts_synced_at(&self) -> Option<i64> {
        self.contacts_synced_at.get()
    }

    pub fn drafts(&self) -> BTreeMap<CookId, String> {
        self.drafts.get()
    }

    pub(crate) fn contacts_slice(&self) -> &PersistedSlice<Option<i64>> {
        &self.contacts_synced_at
    }

    pub(crate) fn drafts_slice(&self) -> &PersistedSlice<BTreeMap<CookId, String>> {
        &self.drafts
    }
}

pub(crate) type UserList = Resource<Vec<UserSummary>>;

/// Fetch and decode a list of users.
pub(crate) async fn fetch_user_list(api: &dyn ApiClient, path: &str) -> Result<Vec<UserSummary>> {
    let body = api.get(path).await?;
    Ok(wire::decode_user_list(body)?)
}

/// One user's client-side state.
pub struct Session {
    api: Arc<dyn ApiClient>,
    notifier: Arc<dyn Notifier>,
    cooks: Arc<EntityCache<Cook>>,
    profiles: Arc<EntityCache<UserProfile>>,
    feeds: FeedRegistry,
    mutations: MutationCoordinator,
    persistence: Arc<Persistence>,
    state: Arc<SessionState>,
    reactor: Reactor<SessionState>,
    search: Arc<UserList>,
    suggestions: Arc<UserList>,
}

impl Session {
    /// Wire up a session. Nothing is loaded until [`start`](Self::start)
    /// or [`hydrate`](Self::hydrate).
    pub fn new(services: Services, config: SessionConfig) -> Self {
        let Services {
            api,
            storage,
            preloader,
            notifier,
        } = services;

        let cooks = Arc::new(EntityCache::new(
            Arc::new(CookFetcher::new(Arc::clone(&api))),
            Arc::clone(&preloader),
            config.cache(),
        ));
        let profiles = Arc::new(EntityCache::new(
            Arc::new(ProfileFetcher::new(Arc::clone(&api))),
            preloader,
            config.cache(),
        ));

        let feed_api = Arc::clone(&api);
        let feeds = FeedRegistry::new(Arc::clone(&cooks), move |key| -> Arc<dyn PageSource> {
            match key {
                FeedKey::Home => Arc::new(HomeFeedSource::new(Arc::clone(&feed_api))),
                FeedKey::User(username) => {
                    Arc::new(UserCooksSource::new(Arc::clone(&feed_api), username.clone()))
                }
            }
        });

        let persistence = Persistence::new(storage, config.persist());
        let state = Arc::new(SessionState::new(&persistence));
        let search = Arc::new(Resource::new("search"));
        let suggestions = Arc::new(Resource::new("suggestions"));

        let reactor = Reactor::new();
        reactions::install(
            &reactor,
            &state,
            reactions::Wiring {
                api: Arc::clone(&api),
                search: Arc::clone(&search),
                suggestions: Arc::clone(&suggestions),
                suggestions_debounce: config.suggestions_debounce(),
            },
        );
        reactor.rebase(&state);

        Self {
            mutations: MutationCoordinator::new(Arc::clone(&notifier), config.limits()),
            api,
            notifier,
            cooks,
            profiles,
            feeds,
            persistence,
            state,
            reactor,
            search,
            suggestions,
        }
    }

    /// Hydrate persisted slices and load the followed-usernames set.
    pub async fn start(&self) -> crate::Result<()> {
        self.hydrate().await;
        self.load_following().await?;
        Ok(())
    }

    /// Load persisted slices. Until this completes nothing is persisted.
    pub async fn hydrate(&self) {
        tokio::join!(
            self.state.contacts_slice().hydrate(),
            self.state.drafts_slice().hydrate(),
        );
        self.reactor.rebase(&self.state);
        tracing::info!(
            drafts = self.state.drafts().len(),
            contacts_synced = self.state.contacts_synced_at().is_some(),
            "session hydrated"
        );
    }

    /// Replace the followed-usernames set from the server.
    pub async fn load_following(&self) -> Result<usize> {
        let body = self.api.get(&paths::following()).await?;
        let usernames: BTreeSet<Username> = wire::decode_following(body)?.into_iter().collect();
        let count = usernames.len();
        self.state.replace_following(usernames);
        self.react();
        Ok(count)
    }

    /// Write every pending persisted value now.
    pub async fn shutdown(&self) {
        self.persistence.flush().await;
        tracing::info!("session shut down");
    }

    /// End of a transaction: run the reactions of whatever changed.
    fn react(&self) -> usize {
        self.reactor.flush(&self.state)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Getters
    // ─────────────────────────────────────────────────────────────────────────

    pub fn cook(&self, id: &CookId) -> Option<Cook> {
        self.cooks.get(id)
    }

    pub fn profile(&self, username: &Username) -> Option<UserProfile> {
        self.profiles.get(username)
    }

    pub fn feed(&self, key: &FeedKey) -> Arc<FeedController> {
        self.feeds.feed(key)
    }

    pub fn feed_ids(&self, key: &FeedKey) -> Vec<CookId> {
        self.feed(key).ids()
    }

    pub fn has_more(&self, key: &FeedKey) -> bool {
        self.feed(key).has_more()
    }

    pub fn is_loading(&self, key: &FeedKey) -> bool {
        self.feed(key).is_loading()
    }

    pub fn search_results(&self) -> Vec<UserSummary> {
        self.search.value().unwrap_or_default()
    }

    pub fn search_state(&self) -> LoadState<Vec<UserSummary>> {
        self.search.state()
    }

    pub fn suggested_friends(&self) -> Vec<UserSummary> {
        self.suggestions.value().unwrap_or_default()
    }

    pub fn suggestions_state(&self) -> LoadState<Vec<UserSummary>> {
        self.suggestions.state()
    }

    pub fn draft_notes(&self, id: &CookId) -> Option<String> {
        self.state.drafts_slice().read(|drafts| drafts.get(id).cloned())
    }

    pub fn following(&self) -> BTreeSet<Username> {
        self.state.following()
    }

    pub fn is_following(&self, username: &Username) -> bool {
        self.state.is_following(username)
    }

    pub fn contacts_synced_at(&self) -> Option<i64> {
        self.state.contacts_synced_at()
    }

    pub fn cooks(&self) -> &Arc<EntityCache<Cook>> {
        &self.cooks
    }

    pub fn profiles(&self) -> &Arc<EntityCache<UserProfile>> {
        &self.profiles
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Loading
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn ensure_cook(&self, id: &CookId) -> Result<Cook> {
        self.cooks.ensure_loaded(id).await
    }

    pub async fn ensure_profile(&self, username: &Username) -> Result<UserProfile> {
        self.profiles.ensure_loaded(username).await
    }

    /// Warm the cook cache in the background.
    pub fn preload_cook(&self, id: &CookId) -> JoinHandle<()> {
        self.cooks.preload(id)
    }

    pub async fn load_first_page(&self, key: &FeedKey) -> Result<PageOutcome> {
        self.feed(key).load_first_page().await
    }

    pub async fn load_next_page(&self, key: &FeedKey) -> Result<PageOutcome> {
        self.feed(key).load_next_page().await
    }

    /// Search users. A blank query clears the results without a request.
    pub async fn search_users(&self, query: &str) -> Result<Vec<UserSummary>> {
        let query = query.trim();
        if query.is_empty() {
            self.search.reset();
            return Ok(Vec::new());
        }
        let path = paths::search_users(query);
        self.search.load(fetch_user_list(self.api.as_ref(), &path)).await
    }

    pub async fn refresh_suggestions(&self) -> Result<Vec<UserSummary>> {
        let path = paths::suggested_users();
        self.suggestions
            .load(fetch_user_list(self.api.as_ref(), &path))
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cook mutations
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn like(&self, id: &CookId) -> Result<()> {
        self.set_liked(id, true).await
    }

    pub async fn unlike(&self, id: &CookId) -> Result<()> {
        self.set_liked(id, false).await
    }

    async fn set_liked(&self, id: &CookId, liked: bool) -> Result<()> {
        let action = if liked { Action::Like } else { Action::Unlike };
        let path = paths::cook_like(id);
        let remote = if liked {
            self.api.post(&path, None)
        } else {
            self.api.delete(&path)
        };
        let result = self
            .mutations
            .patch(&self.cooks, id, action, |cook| cook.like_patch(liked), remote)
            .await;
        self.react();
        result.map(|_| ())
    }

    /// Delete a cook. It disappears from every feed until the server
    /// answers; a failure puts it back in place.
    pub async fn delete_cook(&self, id: &CookId) -> Result<()> {
        let path = paths::cook(id);
        self.mutations
            .remove(&self.cooks, id, self.api.delete(&path))
            .await?;
        self.notifier.success("Cook deleted");
        self.clear_draft(id);
        Ok(())
    }

    /// Replace a cook's notes. Clears the notes draft on success.
    pub async fn edit_notes(&self, id: &CookId, notes: &str) -> Result<()> {
        self.mutations.validate_notes(notes)?;
        let patch = CookPatch::notes(notes);
        self.edit(id, Action::EditNotes, patch, |cook| cook.notes != notes)
            .await?;
        self.clear_draft(id);
        Ok(())
    }

    /// Replace a cook's photos.
    pub async fn edit_photos(&self, id: &CookId, photos: Vec<PhotoRef>) -> Result<()> {
        self.mutations.validate_photos(&photos)?;
        let changed = |cook: &Cook| cook.photos != photos;
        let patch = CookPatch::photos(photos.clone());
        self.edit(id, Action::EditPhotos, patch, changed).await
    }

    async fn edit<F>(&self, id: &CookId, action: Action, patch: CookPatch, changed: F) -> Result<()>
    where
        F: FnOnce(&Cook) -> bool,
    {
        let path = paths::cook(id);
        let remote = self.api.put(&path, Some(wire::encode_cook_edit(&patch)));
        let result = self
            .mutations
            .patch(&self.cooks, id, action, |cook| changed(cook).then_some(patch), remote)
            .await;
        self.react();

        if let Some(body) = result? {
            match wire::decode_cook_patch(body) {
                Ok(server) if !server.is_empty() => {
                    self.cooks.merge(id, &server);
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(%id, %error, "ignoring malformed edit response");
                }
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Profile mutations
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn follow(&self, username: &Username) -> Result<()> {
        self.set_following(username, true).await
    }

    pub async fn unfollow(&self, username: &Username) -> Result<()> {
        self.set_following(username, false).await
    }

    /// Follow or unfollow. Updates the cached profile, if any, and the
    /// followed-usernames set, which search results and suggestions follow.
    async fn set_following(&self, username: &Username, following: bool) -> Result<()> {
        let action = if following {
            Action::Follow
        } else {
            Action::Unfollow
        };
        let path = paths::follow(username);
        let remote = if following {
            self.api.post(&path, None)
        } else {
            self.api.delete(&path)
        };

        let snapshot = Mutex::new(None);
        let set_changed = Mutex::new(false);
        let apply = || {
            let cached = self.profiles.contains(username);
            let profile = self
                .profiles
                .patch_with(username, |profile| profile.follow_patch(following));
            if cached && profile.is_none() {
                return false;
            }
            let changed = self.state.set_following(username, following);
            if !cached && !changed {
                return false;
            }
            *lock(&snapshot) = profile;
            *lock(&set_changed) = changed;
            self.react();
            true
        };
        let rollback = || {
            if let Some(previous) = lock(&snapshot).take() {
                self.profiles.merge(username, &previous);
            }
            if *lock(&set_changed) {
                self.state.set_following(username, !following);
            }
            self.react();
        };

        self.mutations
            .execute(&entity_key::<UserProfile>(username), action, apply, remote, rollback)
            .await?;
        Ok(())
    }

    pub async fn block(&self, username: &Username) -> Result<()> {
        self.set_blocked(username, true).await
    }

    pub async fn unblock(&self, username: &Username) -> Result<()> {
        self.set_blocked(username, false).await
    }

    /// Block or unblock. Blocking also drops an existing follow.
    async fn set_blocked(&self, username: &Username, blocked: bool) -> Result<()> {
        let key = entity_key::<UserProfile>(username);
        if !self.profiles.contains(username) {
            return Err(LarderError::NotFound(key));
        }
        let action = if blocked {
            Action::Block
        } else {
            Action::Unblock
        };
        let path = paths::block(username);
        let remote = if blocked {
            self.api.post(&path, None)
        } else {
            self.api.delete(&path)
        };

        let snapshot = Mutex::new(None);
        let unfollowed = Mutex::new(false);
        let apply = || {
            let Some(previous) = self
                .profiles
                .patch_with(username, |profile| profile.block_patch(blocked))
            else {
                return false;
            };
            *lock(&snapshot) = Some(previous);
            if blocked {
                *lock(&unfollowed) = self.state.set_following(username, false);
            }
            self.react();
            true
        };
        let rollback = || {
            if let Some(previous) = lock(&snapshot).take() {
                self.profiles.merge(username, &previous);
            }
            if *lock(&unfollowed) {
                self.state.set_following(username, true);
            }
            self.react();
        };

        self.mutations
            .execute(&key, action, apply, remote, rollback)
            .await?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Local state
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a completed contacts sync. Suggestions refresh shortly after.
    pub fn mark_contacts_synced(&self, at: i64) {
        self.state.contacts_slice().set(Some(at));
        self.react();
    }

    /// Save unsent notes for a cook. Empty text clears the draft.
    pub fn set_draft_notes(&self, id: &CookId, notes: &str) {
        self.state.drafts_slice().update(|drafts| {
            if notes.is_empty() {
                drafts.remove(id);
            } else {
                drafts.insert(id.clone(), notes.to_string());
            }
        });
        self.react();
    }

    /// Returns whether a draft existed.
    pub fn clear_draft(&self, id: &CookId) -> bool {
        let existed = self
            .state
            .drafts_slice()
            .update(|drafts| drafts.remove(id).is_some());
        if existed {
            self.react();
        }
        existed
    }
}
