//! # Larder Sync
//!
//! Everything that moves state between the remote API and the entity caches.
//!
//! ## Overview
//!
//! - [`ApiClient`] - The remote API collaborator (transport, auth and retries are its job)
//! - [`FeedController`] - Cursor-paginated lists of cook ids
//! - [`MutationCoordinator`] - Optimistic apply, remote call, rollback on failure
//! - [`Reactor`] - "When this derived value changes, run that effect"
//!
//! ## Mutation Flow
//!
//! ```text
//! UI action
//!   |-- busy check (entity, action) ---- reject if in flight
//!   |-- snapshot touched fields
//!   |-- apply patch to cache ----------- every view sees it now
//!   |-- remote call ...
//!   |     ok:   done
//!   |     err:  restore snapshot, notify
//!   '-- release busy flag
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use larder_core::{CookId, LogNotifier, NoopPreloader};
//! use larder_store::{CacheConfig, EntityCache};
//! use larder_sync::{Action, ApiClient, CookFetcher, MutationCoordinator, MutationLimits};
//!
//! async fn like(api: Arc<dyn ApiClient>) -> larder_core::Result<()> {
//!     let cooks = EntityCache::new(
//!         Arc::new(CookFetcher::new(api.clone())),
//!         Arc::new(NoopPreloader),
//!         CacheConfig::default(),
//!     );
//!     let mutations = MutationCoordinator::new(Arc::new(LogNotifier), MutationLimits::default());
//!
//!     let id = CookId::new("42");
//!     cooks.ensure_loaded(&id).await?;
//!     let path = larder_sync::paths::cook_like(&id);
//!     mutations
//!         .patch(&cooks, &id, Action::Like, |c| c.like_patch(true), api.post(&path, None))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod feed;
pub mod mutation;
pub mod reactor;

pub use api::{paths, ApiClient, CookFetcher, HomeFeedSource, ProfileFetcher, UserCooksSource};
pub use feed::{FeedController, FeedKey, FeedRegistry, PageOutcome, PageSource};
pub use mutation::{entity_key, Action, MutationCoordinator, MutationGuard, MutationLimits};
pub use reactor::{Reactor, Rule};
