//! The contract between record types and the entity cache.

use std::fmt::{Debug, Display};
use std::hash::Hash;

/// A record type that can live in an entity cache.
///
/// Every entity has a companion patch type with one optional field per
/// mutable field. Patches drive merge-saves, optimistic changes and their
/// rollback.
pub trait Entity: Clone + Debug + Send + Sync + 'static {
    /// The stable identifier.
    type Id: Clone + Eq + Hash + Ord + Debug + Display + Send + Sync + 'static;

    /// A partial update.
    type Patch: Clone + Debug + Default + PartialEq + Send + Sync + 'static;

    /// Short name used in log lines.
    const KIND: &'static str;

    /// The record's identifier.
    fn id(&self) -> &Self::Id;

    /// Shallow-merge every field the patch sets.
    fn apply(&mut self, patch: &Self::Patch);

    /// Capture the current values of exactly the fields `patch` sets.
    ///
    /// Applying the returned patch after `patch` restores those fields and
    /// leaves every other field untouched.
    fn capture(&self, patch: &Self::Patch) -> Self::Patch;

    /// Image URLs worth warming when the record arrives.
    fn image_urls(&self) -> Vec<String> {
        Vec::new()
    }
}
