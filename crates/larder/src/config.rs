//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use larder_store::{CacheConfig, PersistConfig};
use larder_sync::MutationLimits;

use crate::error::Result;

/// Tunables for a [`Session`](crate::Session). Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Age after which a cached record is refetched. 0 disables expiry.
    pub stale_after_secs: u64,
    /// Quiet period before a persisted slice is written.
    pub persist_debounce_ms: u64,
    /// Delay between a contacts sync and the suggested-friends refresh.
    pub suggestions_debounce_ms: u64,
    pub max_notes_len: usize,
    pub max_photos: usize,
    /// Namespace for local storage keys.
    pub storage_prefix: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 300,
            persist_debounce_ms: 500,
            suggestions_debounce_ms: 250,
            max_notes_len: 2000,
            max_photos: 10,
            storage_prefix: "larder".to_string(),
        }
    }
}

impl SessionConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn cache(&self) -> CacheConfig {
        CacheConfig {
            stale_after: (self.stale_after_secs > 0)
                .then(|| Duration::from_secs(self.stale_after_secs)),
        }
    }

    pub fn persist(&self) -> PersistConfig {
        PersistConfig {
            debounce: Duration::from_millis(self.persist_debounce_ms),
            prefix: self.storage_prefix.clone(),
        }
    }

    pub fn limits(&self) -> MutationLimits {
        MutationLimits {
            max_notes_len: self.max_notes_len,
            max_photos: self.max_photos,
        }
    }

    pub fn suggestions_debounce(&self) -> Duration {
        Duration::from_millis(self.suggestions_debounce_ms)
    }
}
