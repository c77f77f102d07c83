//! Optimistic mutations.
//!
//! Every mutation follows the same protocol:
//!
//! 1. Claim the busy flag for the entity and the action's slot, or fail
//!    immediately.
//! 2. Snapshot the fields about to change.
//! 3. Apply the change to the cache, before any network call.
//! 4. Make the remote call.
//! 5. On failure, restore exactly the snapshotted fields and notify once.
//!
//! The busy flag is released on every exit path by [`MutationGuard`].

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use larder_core::{Entity, LarderError, Notifier, PhotoRef, Result, StateError, ValidationError};
use larder_store::EntityCache;

/// A user-initiated change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Like,
    Unlike,
    Follow,
    Unfollow,
    Block,
    Unblock,
    Delete,
    EditNotes,
    EditPhotos,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Like => "like",
            Action::Unlike => "unlike",
            Action::Follow => "follow",
            Action::Unfollow => "unfollow",
            Action::Block => "block",
            Action::Unblock => "unblock",
            Action::Delete => "delete",
            Action::EditNotes => "edit_notes",
            Action::EditPhotos => "edit_photos",
        }
    }

    /// The busy slot this action claims. Actions that write the same
    /// fields share a slot, so opposite toggles never overlap.
    pub fn slot(self) -> &'static str {
        match self {
            Action::Like | Action::Unlike => "like",
            Action::Follow | Action::Unfollow | Action::Block | Action::Unblock => "relationship",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input limits for field edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationLimits {
    /// Maximum notes length, in characters.
    pub max_notes_len: usize,
    pub max_photos: usize,
}

impl Default for MutationLimits {
    fn default() -> Self {
        Self {
            max_notes_len: 2000,
            max_photos: 10,
        }
    }
}

type BusyKey = (String, &'static str);
type BusySet = Arc<Mutex<HashSet<BusyKey>>>;

fn lock(busy: &BusySet) -> MutexGuard<'_, HashSet<BusyKey>> {
    busy.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds the busy flag for one `(entity, slot)` pair.
pub struct MutationGuard {
    busy: BusySet,
    key: BusyKey,
}

impl Drop for MutationGuard {
    fn drop(&mut self) {
        lock(&self.busy).remove(&self.key);
    }
}

/// Cache key of an entity in busy flags and error messages, e.g. `cook:42`.
pub fn entity_key<E: Entity>(id: &E::Id) -> String {
    format!("{}:{}", E::KIND, id)
}

/// Runs optimistic mutations and tracks which are in flight.
pub struct MutationCoordinator {
    busy: BusySet,
    notifier: Arc<dyn Notifier>,
    limits: MutationLimits,
}

impl MutationCoordinator {
    pub fn new(notifier: Arc<dyn Notifier>, limits: MutationLimits) -> Self {
        Self {
            busy: Arc::new(Mutex::new(HashSet::new())),
            notifier,
            limits,
        }
    }

    pub fn limits(&self) -> MutationLimits {
        self.limits
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Claim the busy flag for `key` and the slot of `action`.
    pub fn begin(&self, key: &str, action: Action) -> Result<MutationGuard> {
        let claim = (key.to_string(), action.slot());
        if !lock(&self.busy).insert(claim.clone()) {
            tracing::debug!(key, %action, "mutation already in flight");
            return Err(StateError::MutationInFlight {
                key: key.to_string(),
                action: action.as_str(),
            }
            .into());
        }
        Ok(MutationGuard {
            busy: Arc::clone(&self.busy),
            key: claim,
        })
    }

    pub fn is_busy(&self, key: &str, action: Action) -> bool {
        lock(&self.busy).contains(&(key.to_string(), action.slot()))
    }

    fn failed(&self, key: &str, action: Action, error: &LarderError) {
        tracing::warn!(key, %action, %error, "mutation failed, rolled back");
        self.notifier.error(action.as_str(), error);
    }

    /// Run a mutation with caller-supplied apply and rollback steps.
    ///
    /// `apply` returns `false` when there is nothing to change; the call
    /// then resolves to `Ok(None)`. `remote` is polled only after a
    /// successful apply.
    pub async fn execute<T, A, Fut, R>(
        &self,
        key: &str,
        action: Action,
        apply: A,
        remote: Fut,
        rollback: R,
    ) -> Result<Option<T>>
    where
        A: FnOnce() -> bool,
        Fut: Future<Output = Result<T>>,
        R: FnOnce(),
    {
        let _guard = self.begin(key, action)?;
        if !apply() {
            tracing::debug!(key, %action, "already in target state");
            return Ok(None);
        }
        match remote.await {
            Ok(value) => Ok(Some(value)),
            Err(error) => {
                rollback();
                self.failed(key, action, &error);
                Err(error)
            }
        }
    }

    /// Patch a cached record optimistically.
    ///
    /// `make_patch` computes the change from the current record; returning
    /// `None` means there is nothing to do, and the call resolves to
    /// `Ok(None)` without polling `remote`. An uncached record is
    /// `NotFound`.
    pub async fn patch<E, T, F, Fut>(
        &self,
        cache: &EntityCache<E>,
        id: &E::Id,
        action: Action,
        make_patch: F,
        remote: Fut,
    ) -> Result<Option<T>>
    where
        E: Entity,
        F: FnOnce(&E) -> Option<E::Patch>,
        Fut: Future<Output = Result<T>>,
    {
        let key = entity_key::<E>(id);
        let _guard = self.begin(&key, action)?;

        let Some(snapshot) = cache.patch_with(id, make_patch) else {
            if cache.contains(id) {
                tracing::debug!(key = %key, %action, "already in target state");
                return Ok(None);
            }
            return Err(LarderError::NotFound(key));
        };

        match remote.await {
            Ok(value) => Ok(Some(value)),
            Err(error) => {
                cache.merge(id, &snapshot);
                self.failed(&key, action, &error);
                Err(error)
            }
        }
    }

    /// Remove a cached record optimistically; a failed call restores it.
    pub async fn remove<E, T, Fut>(
        &self,
        cache: &EntityCache<E>,
        id: &E::Id,
        remote: Fut,
    ) -> Result<T>
    where
        E: Entity,
        Fut: Future<Output = Result<T>>,
    {
        let key = entity_key::<E>(id);
        let _guard = self.begin(&key, Action::Delete)?;

        let Some(record) = cache.remove(id) else {
            return Err(LarderError::NotFound(key));
        };

        match remote.await {
            Ok(value) => {
                cache.forget(id);
                Ok(value)
            }
            Err(error) => {
                cache.restore(record);
                self.failed(&key, Action::Delete, &error);
                Err(error)
            }
        }
    }

    pub fn validate_notes(&self, notes: &str) -> std::result::Result<(), ValidationError> {
        let len = notes.chars().count();
        if len > self.limits.max_notes_len {
            return Err(ValidationError::TooLong {
                field: "notes",
                len,
                max: self.limits.max_notes_len,
            });
        }
        Ok(())
    }

    pub fn validate_photos(&self, photos: &[PhotoRef]) -> std::result::Result<(), ValidationError> {
        if photos.len() > self.limits.max_photos {
            return Err(ValidationError::TooMany {
                field: "photos",
                len: photos.len(),
                max: self.limits.max_photos,
            });
        }
        if photos.iter().any(PhotoRef::is_empty) {
            return Err(ValidationError::Empty { field: "photos" });
        }
        Ok(())
    }
}
