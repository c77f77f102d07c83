//! Error taxonomy shared by every Larder layer.

use thiserror::Error;

/// Errors surfaced by cache, feed and mutation operations.
///
/// Cloneable so that every caller attached to a coalesced fetch can observe
/// the same failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LarderError {
    /// Transport failure, timeout or non-2xx response.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed input rejected before any call was made, or a malformed body.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A precondition of the API was violated by the caller.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The session user may not see or change the resource.
    #[error("permission denied: {0}")]
    Permission(String),
}

impl LarderError {
    /// Create a network error from any message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Whether this error is a programming-contract violation.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, LarderError::State(_))
    }
}

/// Input validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} is {len} characters, maximum is {max}")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("{field} has {len} entries, maximum is {max}")]
    TooMany {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("malformed body: {0}")]
    Malformed(String),
}

/// Precondition violations.
///
/// These are bugs in the calling code, not user-facing failures. UI call
/// sites are expected to check `is_loading` / `has_more` before calling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("feed {feed} already has a page request in flight")]
    FeedBusy { feed: String },

    #[error("feed {feed} has no more pages")]
    FeedExhausted { feed: String },

    #[error("{action} on {key} is already in flight")]
    MutationInFlight { key: String, action: &'static str },
}

/// Result type for Larder operations.
pub type Result<T> = std::result::Result<T, LarderError>;
