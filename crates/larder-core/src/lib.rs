//! # Larder Core
//!
//! Pure domain types for Larder: records, identifiers, the wire boundary and
//! the shared error taxonomy.
//!
//! This crate contains no I/O, no caching and no scheduling. Everything that
//! touches the network or storage lives in `larder-store` and `larder-sync`.
//!
//! ## Key Types
//!
//! - [`Cook`] - A cook entry: one person's take on a recipe, with photos and likes
//! - [`UserProfile`] - A profile page record
//! - [`Entity`] - The contract every cached record type implements
//! - [`LarderError`] - The error taxonomy shared by every layer
//!
//! ## Wire Boundary
//!
//! Records never carry wire-format field names. The [`wire`] module decodes
//! camelCase JSON bodies into records and encodes edits back.

pub mod entity;
pub mod error;
pub mod ids;
pub mod record;
pub mod services;
pub mod wire;

pub use entity::Entity;
pub use error::{LarderError, Result, StateError, ValidationError};
pub use ids::{CookId, PhotoRef, RecipeId, Username};
pub use record::{Cook, CookPatch, RecipeRef, UserPatch, UserProfile, UserSummary};
pub use services::{ImagePreloader, LogNotifier, Notifier, NoopPreloader};
