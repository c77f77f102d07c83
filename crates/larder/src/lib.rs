//! # Larder
//!
//! The client-side domain store for a social cooking app: a normalized
//! cache of cooks and profiles, paginated feeds, optimistic mutations with
//! rollback, and debounced local persistence.
//!
//! ## Overview
//!
//! - **Entity cache**: one record per id, shared by every view
//! - **Feeds**: id lists over the cache, loaded page by page
//! - **Mutations**: applied locally first, rolled back if the server refuses
//! - **Reactions**: explicit rules run at the end of each transaction
//! - **Persistence**: drafts and the contacts-sync time survive restarts
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use larder::{FeedKey, Services, Session, SessionConfig};
//! use larder::store::MemoryStorage;
//! use larder::sync::ApiClient;
//!
//! async fn example(api: Arc<dyn ApiClient>) -> larder::Result<()> {
//!     larder::telemetry::init();
//!
//!     let services = Services::new(api, Arc::new(MemoryStorage::new()));
//!     let session = Session::new(services, SessionConfig::default());
//!     session.start().await?;
//!
//!     session.load_first_page(&FeedKey::Home).await?;
//!     for id in session.feed_ids(&FeedKey::Home) {
//!         session.like(&id).await?;
//!     }
//!
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `larder::core` - Records, ids, errors and collaborator traits
//! - `larder::store` - Entity cache, resources, persistence and storage
//! - `larder::sync` - API client, feeds, mutations and the reactor

pub mod config;
pub mod error;
mod reactions;
pub mod session;
pub mod telemetry;

pub use larder_core as core;
pub use larder_store as store;
pub use larder_sync as sync;

pub use config::SessionConfig;
pub use error::{Result, SessionError};
pub use session::{Services, Session, SessionState};

pub use larder_core::{
    Cook, CookId, CookPatch, LarderError, PhotoRef, StateError, UserProfile, UserSummary, Username,
    ValidationError,
};
pub use larder_store::LoadState;
pub use larder_sync::{FeedKey, PageOutcome};
