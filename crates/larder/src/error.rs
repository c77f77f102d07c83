//! Error types for session setup.

use larder_core::LarderError;
use larder_store::StoreError;
use thiserror::Error;

/// Errors that can occur while building or starting a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The configuration document could not be parsed.
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// The local storage backend could not be opened.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// A startup request failed.
    #[error(transparent)]
    Larder(#[from] LarderError),
}

/// Result type for session setup.
pub type Result<T> = std::result::Result<T, SessionError>;
