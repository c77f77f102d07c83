//! End-to-end properties of a session over the mock API.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use larder::store::{MemoryStorage, PersistConfig, Persistence, SqliteStorage};
use larder::{CookId, CookPatch, FeedKey, LarderError, StateError, Username};
use larder_testkit::fixtures::{cook_json, cooks_page, following_json, page_json};
use larder_testkit::generators::overlapping_pages;
use larder_testkit::{Method, TestSession};

fn alice() -> FeedKey {
    FeedKey::User(Username::new("alice"))
}

#[tokio::test(start_paused = true)]
async fn concurrent_loads_issue_one_request() {
    let t = TestSession::new();
    t.api.set_latency(Duration::from_millis(50));
    t.api.on(Method::Get, "/cooks/42", Ok(cook_json("42", "alice", 3, false)));
    let id = CookId::new("42");

    let (a, b, c, d, e) = tokio::join!(
        t.session.ensure_cook(&id),
        t.session.ensure_cook(&id),
        t.session.ensure_cook(&id),
        t.session.ensure_cook(&id),
        t.session.ensure_cook(&id),
    );

    assert_eq!(t.api.count(Method::Get, "/cooks/42"), 1);
    let a = a.unwrap();
    for other in [b, c, d, e] {
        assert_eq!(other.unwrap(), a);
    }
    assert_eq!(t.preloader.urls(), vec!["https://img.example/42.jpg".to_string()]);
}

#[tokio::test]
async fn like_applies_optimistically_and_succeeds() {
    let t = TestSession::new();
    t.api.on(Method::Get, "/cooks/42", Ok(cook_json("42", "alice", 3, false)));
    let id = CookId::new("42");
    t.session.ensure_cook(&id).await.unwrap();

    t.session.like(&id).await.unwrap();

    let cook = t.session.cook(&id).unwrap();
    assert_eq!((cook.like_count, cook.liked_by_me), (4, true));
    assert_eq!(t.api.count(Method::Post, "/cooks/42/like"), 1);
    assert_eq!(t.notifier.error_count(), 0);
}

#[tokio::test]
async fn rejected_like_rolls_back_and_notifies_once() {
    let t = TestSession::new();
    t.api
        .on(Method::Get, "/cooks/42", Ok(cook_json("42", "alice", 3, false)))
        .on(Method::Post, "/cooks/42/like", Err(LarderError::network("503")));
    let id = CookId::new("42");
    t.session.ensure_cook(&id).await.unwrap();

    let err = t.session.like(&id).await.unwrap_err();

    assert_eq!(err, LarderError::network("503"));
    let cook = t.session.cook(&id).unwrap();
    assert_eq!((cook.like_count, cook.liked_by_me), (3, false));
    let errors = t.notifier.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "like");
}

#[tokio::test]
async fn like_on_liked_cook_makes_no_request() {
    let t = TestSession::new();
    t.api.on(Method::Get, "/cooks/42", Ok(cook_json("42", "alice", 4, true)));
    let id = CookId::new("42");
    t.session.ensure_cook(&id).await.unwrap();

    t.session.like(&id).await.unwrap();
    assert_eq!(t.api.count(Method::Post, "/cooks/42/like"), 0);
    assert_eq!(t.session.cook(&id).unwrap().like_count, 4);
}

#[tokio::test]
async fn empty_page_ends_the_feed() {
    let t = TestSession::new();
    t.api
        .on(Method::Get, "/users/alice/cooks?page=1", Ok(cooks_page("alice", 1, 20)))
        .on(Method::Get, "/users/alice/cooks?page=2", Ok(page_json(Vec::new())));

    let first = t.session.load_first_page(&alice()).await.unwrap();
    assert_eq!(first.received, 20);
    assert!(t.session.has_more(&alice()));

    let second = t.session.load_next_page(&alice()).await.unwrap();
    assert_eq!(second.received, 0);
    assert!(!t.session.has_more(&alice()));

    let err = t.session.load_next_page(&alice()).await.unwrap_err();
    assert_eq!(
        err,
        LarderError::State(StateError::FeedExhausted {
            feed: "user:alice".into()
        })
    );
    assert!(err.is_contract_violation());
    assert_eq!(t.api.count(Method::Get, "/users/alice/cooks?page=2"), 1);
    assert_eq!(t.api.count(Method::Get, "/users/alice/cooks?page=3"), 0);
    assert_eq!(t.session.feed_ids(&alice()).len(), 20);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Paging through overlapping pages never yields a duplicate id.
    #[test]
    fn paging_never_duplicates(pages in overlapping_pages(5, 8, 16)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();

        let t = TestSession::new();
        for (i, page) in pages.iter().enumerate() {
            let body = page_json(page.iter().map(|id| cook_json(id, "alice", 0, false)).collect());
            t.api.on(Method::Get, &format!("/users/alice/cooks?page={}", i + 1), Ok(body));
        }
        let last = format!("/users/alice/cooks?page={}", pages.len() + 1);
        t.api.on(Method::Get, &last, Ok(page_json(Vec::new())));

        runtime.block_on(async {
            t.session.load_first_page(&alice()).await.unwrap();
            while t.session.has_more(&alice()) {
                t.session.load_next_page(&alice()).await.unwrap();
            }
        });

        let ids = t.session.feed_ids(&alice());
        let unique: HashSet<&CookId> = ids.iter().collect();
        prop_assert_eq!(unique.len(), ids.len());

        let expected: HashSet<String> = pages.iter().flatten().cloned().collect();
        prop_assert_eq!(unique.len(), expected.len());
    }
}

#[tokio::test(start_paused = true)]
async fn drafts_survive_a_restart() {
    let t = TestSession::new();
    t.api.on(Method::Get, "/me/following", Ok(following_json(&[])));
    t.session.start().await.unwrap();

    let id = CookId::new("7");
    t.session.set_draft_notes(&id, "less salt next time");
    t.session.shutdown().await;

    let restarted = t.restart();
    restarted.start().await.unwrap();
    assert_eq!(restarted.draft_notes(&id).as_deref(), Some("less salt next time"));
}

#[tokio::test]
async fn sqlite_values_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("larder.db");

    let mut value = BTreeMap::new();
    value.insert("7".to_string(), vec![1i64, 2, 3]);
    value.insert("8".to_string(), Vec::new());

    {
        let storage = Arc::new(SqliteStorage::open(&path).unwrap());
        let persistence = Persistence::new(storage, PersistConfig::default());
        persistence.save("slices", &value);
        persistence.flush().await;
    }

    let storage = Arc::new(SqliteStorage::open(&path).unwrap());
    let persistence = Persistence::new(storage, PersistConfig::default());
    let loaded: Option<BTreeMap<String, Vec<i64>>> = persistence.load("slices").await;
    assert_eq!(loaded, Some(value));
}

#[tokio::test(start_paused = true)]
async fn burst_of_edits_writes_once() {
    let t = TestSession::new();
    t.api.on(Method::Get, "/me/following", Ok(following_json(&[])));
    t.session.start().await.unwrap();
    let id = CookId::new("7");

    for text in ["l", "le", "les", "less", "less salt"] {
        t.session.set_draft_notes(&id, text);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(t.storage.write_count(), 0);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(t.storage.write_count(), 1);
    assert_eq!(
        t.storage.raw("larder:draft_notes").as_deref(),
        Some(r#"{"7":"less salt"}"#)
    );
}

#[tokio::test]
async fn merge_is_visible_to_every_view() {
    let t = TestSession::new();
    t.api.on(
        Method::Get,
        "/feed?page=1",
        Ok(page_json(vec![
            cook_json("6", "bob", 0, false),
            cook_json("7", "alice", 2, false),
        ])),
    );
    t.session.load_first_page(&FeedKey::Home).await.unwrap();

    // The detail view reads the record the feed already ingested.
    let id = CookId::new("7");
    t.session.ensure_cook(&id).await.unwrap();
    assert_eq!(t.api.count(Method::Get, "/cooks/7"), 0);

    assert!(t.session.cooks().merge(&id, &CookPatch::notes("new")));

    assert_eq!(t.session.cook(&id).unwrap().notes, "new");
    let feed_view = t.session.feed(&FeedKey::Home).cooks();
    assert_eq!(feed_view[1].notes, "new");
    assert_eq!(feed_view[1].like_count, 2);
    assert_eq!(t.api.count(Method::Get, "/cooks/7"), 0);
}

#[tokio::test(start_paused = true)]
async fn hydration_failure_falls_back_to_defaults() {
    let t = TestSession::new();
    let storage = Arc::new(MemoryStorage::with_entries([("larder:draft_notes", "{not json")]));
    let session = larder::Session::new(
        larder::Services::new(t.api.clone(), storage.clone()),
        larder::SessionConfig::default(),
    );

    session.hydrate().await;
    assert!(session.draft_notes(&CookId::new("7")).is_none());

    session.set_draft_notes(&CookId::new("7"), "fresh");
    session.shutdown().await;
    assert_eq!(storage.raw("larder:draft_notes").as_deref(), Some(r#"{"7":"fresh"}"#));
}
