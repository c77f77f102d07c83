//! Debounced local persistence.
//!
//! `save` serializes immediately but writes only after a quiet period: a
//! burst of saves to one key produces a single storage write carrying the
//! last value. Failures are logged and otherwise ignored; callers fall back
//! to defaults.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;
use crate::storage::KeyValueStorage;

/// Configuration for the persistence adapter.
#[derive(Debug, Clone)]
pub struct PersistConfig {
    /// Quiet period before a pending value is written.
    pub debounce: Duration,
    /// Namespace prepended to every storage key.
    pub prefix: String,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            prefix: "larder".to_string(),
        }
    }
}

struct Pending {
    value: String,
    ticket: u64,
}

/// Debounced save/load against a key-value storage.
pub struct Persistence {
    storage: Arc<dyn KeyValueStorage>,
    config: PersistConfig,
    pending: Mutex<HashMap<String, Pending>>,
    tickets: AtomicU64,
    /// Held across every storage write and removal, so a removal never
    /// lands before a write that already took its value.
    writes: tokio::sync::Mutex<()>,
}

impl Persistence {
    pub fn new(storage: Arc<dyn KeyValueStorage>, config: PersistConfig) -> Arc<Self> {
        Arc::new(Self {
            storage,
            config,
            pending: Mutex::new(HashMap::new()),
            tickets: AtomicU64::new(0),
            writes: tokio::sync::Mutex::new(()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn storage_key(&self, key: &str) -> String {
        if self.config.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.config.prefix, key)
        }
    }

    /// Schedule a debounced write of `value` under `key`.
    ///
    /// Must be called from within a tokio runtime for the write to happen
    /// on its own; otherwise the value waits for [`flush`](Self::flush).
    pub fn save<T: Serialize + ?Sized>(self: &Arc<Self>, key: &str, value: &T) {
        let value = match serde_json::to_string(value).map_err(StoreError::from) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(key, %error, "failed to serialize value, skipping save");
                return;
            }
        };

        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
        self.lock()
            .insert(key.to_string(), Pending { value, ticket });

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(key, "no runtime for debounced write, value stays pending");
                return;
            }
        };
        let this = Arc::clone(self);
        let key = key.to_string();
        let debounce = self.config.debounce;
        handle.spawn(async move {
            tokio::time::sleep(debounce).await;
            this.write_if_current(&key, ticket).await;
        });
    }

    async fn write_if_current(&self, key: &str, ticket: u64) {
        let _writing = self.writes.lock().await;
        let value = {
            let mut pending = self.lock();
            match pending.get(key) {
                Some(p) if p.ticket == ticket => pending.remove(key).map(|p| p.value),
                _ => None,
            }
        };
        if let Some(value) = value {
            self.write(key, value).await;
        }
    }

    async fn write(&self, key: &str, value: String) {
        match self.storage.set(&self.storage_key(key), value).await {
            Ok(()) => tracing::debug!(key, "persisted"),
            Err(error) => tracing::warn!(key, %error, "failed to persist value"),
        }
    }

    /// Load and deserialize the value under `key`.
    ///
    /// Missing, unreadable and unparsable values all yield `None`.
    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.storage.get(&self.storage_key(key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(error) => {
                tracing::warn!(key, %error, "failed to read persisted value");
                return None;
            }
        };
        match serde_json::from_str(&raw).map_err(StoreError::from) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(key, %error, "discarding unparsable persisted value");
                None
            }
        }
    }

    /// Write every pending value now.
    pub async fn flush(&self) {
        let _writing = self.writes.lock().await;
        let drained: Vec<(String, String)> = self
            .lock()
            .drain()
            .map(|(key, pending)| (key, pending.value))
            .collect();
        for (key, value) in drained {
            self.write(&key, value).await;
        }
    }

    /// Cancel any pending write and delete the stored value.
    pub async fn remove(&self, key: &str) {
        let _writing = self.writes.lock().await;
        self.lock().remove(key);
        if let Err(error) = self.storage.remove(&self.storage_key(key)).await {
            tracing::warn!(key, %error, "failed to remove persisted value");
        }
    }

    /// Keys with a write still waiting for its quiet period.
    pub fn pending_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// A persisted value with a "loaded" guard.
///
/// Until [`hydrate`](Self::hydrate) completes, [`persist`](Self::persist)
/// refuses to write, so startup defaults never clobber stored data. A value
/// changed before hydration wins over the stored one and is saved once
/// hydration completes.
pub struct PersistedSlice<T> {
    key: String,
    value: Mutex<T>,
    loaded: AtomicBool,
    changed_early: AtomicBool,
    persistence: Arc<Persistence>,
}

impl<T> PersistedSlice<T>
where
    T: Serialize + DeserializeOwned + Clone + PartialEq + Send + 'static,
{
    pub fn new(persistence: Arc<Persistence>, key: impl Into<String>, default: T) -> Self {
        Self {
            key: key.into(),
            value: Mutex::new(default),
            loaded: AtomicBool::new(false),
            changed_early: AtomicBool::new(false),
            persistence,
        }
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the stored value, if any, and mark the slice loaded.
    ///
    /// Returns whether a stored value was found.
    pub async fn hydrate(&self) -> bool {
        let stored = self.persistence.load::<T>(&self.key).await;
        let found = stored.is_some();
        let changed_early = {
            let mut value = self.lock();
            let changed_early = self.changed_early.swap(false, Ordering::SeqCst);
            if let (false, Some(stored)) = (changed_early, stored) {
                *value = stored;
            }
            self.loaded.store(true, Ordering::SeqCst);
            changed_early
        };
        tracing::debug!(key = %self.key, found, changed_early, "hydrated slice");
        if changed_early {
            self.persist();
        }
        found
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn get(&self) -> T {
        self.lock().clone()
    }

    pub fn set(&self, value: T) {
        self.update(|current| *current = value);
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut value = self.lock();
        if self.is_loaded() {
            return f(&mut value);
        }
        let before = value.clone();
        let result = f(&mut value);
        if *value != before {
            self.changed_early.store(true, Ordering::SeqCst);
        }
        result
    }

    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.lock())
    }

    /// Schedule a debounced save of the current value.
    ///
    /// Returns `false` (and writes nothing) before hydration.
    pub fn persist(&self) -> bool {
        if !self.is_loaded() {
            tracing::debug!(key = %self.key, "slice not loaded yet, skipping save");
            return false;
        }
        let value = self.get();
        self.persistence.save(&self.key, &value);
        true
    }
}
