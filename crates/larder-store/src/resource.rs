//! Async resources: a remote fetch as an observable tri-state value.
//!
//! Each fetch is tagged with a [`Generation`]. Starting a new fetch bumps the
//! generation; a result carrying an older generation is dropped, so a slow
//! stale response can never clobber a newer one.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use larder_core::{LarderError, Result};

/// Observable state of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState<T> {
    /// Nothing requested yet.
    Idle,
    /// A fetch is in flight. `previous` keeps the last ready value visible.
    Loading { previous: Option<T> },
    /// The latest fetch succeeded.
    Ready(T),
    /// The latest fetch failed.
    Failed {
        error: LarderError,
        previous: Option<T>,
    },
}

impl<T> LoadState<T> {
    /// The value to display: the ready value, or the one retained while
    /// revalidating or after a failure.
    pub fn value(&self) -> Option<&T> {
        match self {
            LoadState::Ready(value) => Some(value),
            LoadState::Loading { previous } | LoadState::Failed { previous, .. } => {
                previous.as_ref()
            }
            LoadState::Idle => None,
        }
    }

    fn value_mut(&mut self) -> Option<&mut T> {
        match self {
            LoadState::Ready(value) => Some(value),
            LoadState::Loading { previous } | LoadState::Failed { previous, .. } => {
                previous.as_mut()
            }
            LoadState::Idle => None,
        }
    }

    fn into_value(self) -> Option<T> {
        match self {
            LoadState::Ready(value) => Some(value),
            LoadState::Loading { previous } | LoadState::Failed { previous, .. } => previous,
            LoadState::Idle => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading { .. })
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, LoadState::Ready(_))
    }

    pub fn error(&self) -> Option<&LarderError> {
        match self {
            LoadState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Tag of one fetch within a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn get(self) -> u64 {
        self.0
    }
}

struct ResourceInner<T> {
    state: LoadState<T>,
    generation: u64,
}

/// One logical fetch slot.
pub struct Resource<T> {
    name: String,
    inner: Mutex<ResourceInner<T>>,
}

impl<T: Clone> Resource<T> {
    /// Create an idle resource. `name` only appears in logs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(ResourceInner {
                state: LoadState::Idle,
                generation: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ResourceInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new fetch, superseding any in-flight one.
    pub fn begin(&self) -> Generation {
        let mut inner = self.lock();
        inner.generation += 1;
        let previous = std::mem::replace(&mut inner.state, LoadState::Idle).into_value();
        inner.state = LoadState::Loading { previous };
        Generation(inner.generation)
    }

    /// Apply the terminal transition for `generation`.
    ///
    /// Returns `false` when the result was discarded: the generation was
    /// superseded, or it was already resolved.
    pub fn resolve(&self, generation: Generation, result: Result<T>) -> bool {
        let mut inner = self.lock();
        if generation.0 != inner.generation {
            tracing::debug!(
                resource = %self.name,
                generation = generation.0,
                current = inner.generation,
                "discarding superseded result"
            );
            return false;
        }
        if !inner.state.is_loading() {
            return false;
        }

        let previous = std::mem::replace(&mut inner.state, LoadState::Idle).into_value();
        inner.state = match result {
            Ok(value) => LoadState::Ready(value),
            Err(error) => LoadState::Failed { error, previous },
        };
        true
    }

    /// Run `fetch` as the current generation and return its own result.
    pub async fn load<F>(&self, fetch: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let generation = self.begin();
        let result = fetch.await;
        self.resolve(generation, result.clone());
        result
    }

    /// Edit the displayed value in place. Returns `false` if there is none.
    pub fn modify(&self, f: impl FnOnce(&mut T)) -> bool {
        let mut inner = self.lock();
        match inner.state.value_mut() {
            Some(value) => {
                f(value);
                true
            }
            None => false,
        }
    }

    /// Drop the value and invalidate any in-flight fetch.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.state = LoadState::Idle;
    }

    pub fn state(&self) -> LoadState<T> {
        self.lock().state.clone()
    }

    pub fn value(&self) -> Option<T> {
        self.lock().state.value().cloned()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().state.is_loading()
    }

    pub fn error(&self) -> Option<LarderError> {
        self.lock().state.error().cloned()
    }

    pub fn generation(&self) -> Generation {
        Generation(self.lock().generation)
    }
}
