//! KeyValueStorage trait: the abstract interface for local persistence.
//!
//! This trait keeps the persistence adapter backend-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// Async string key-value storage.
///
/// Backends may fail and must not be assumed durable.
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: String) -> Result<()>;

    /// Delete the value under `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

#[async_trait]
impl<S: KeyValueStorage + ?Sized> KeyValueStorage for Arc<S> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key).await
    }
}
