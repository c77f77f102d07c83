//! Error types for the storage backends.

use thiserror::Error;

/// Errors raised by key-value storage backends and (de)serialization.
///
/// These never leave the persistence adapter: it logs them and falls back
/// to defaults.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Value serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend is unavailable (e.g. a poisoned connection).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
