//! # Larder Testkit
//!
//! Testing utilities for Larder.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: A scripted [`MockApi`], recording notifier and preloader,
//!   failing storage, JSON body builders and a wired [`TestSession`]
//! - **Generators**: Proptest strategies for records and feed pages
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use larder::CookId;
//! use larder_testkit::fixtures::{cook_json, Method, TestSession};
//!
//! # async fn example() {
//! let t = TestSession::new();
//! t.api.on(Method::Get, "/cooks/42", Ok(cook_json("42", "alice", 3, false)));
//!
//! let cook = t.session.ensure_cook(&CookId::new("42")).await.unwrap();
//! assert_eq!(cook.like_count, 3);
//! # }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use larder_testkit::generators::cook;
//!
//! proptest! {
//!     #[test]
//!     fn like_then_unlike_restores_count(c in cook()) {
//!         // ...
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    init_tracing, FailingStorage, Method, MockApi, RecordingNotifier, RecordingPreloader, Request,
    TestSession,
};
