//! Session actions: follows, blocks, deletes, edits, search and reactions.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use larder::{
    CookId, FeedKey, LarderError, LoadState, PhotoRef, Services, Session, SessionConfig,
    StateError, Username, ValidationError,
};
use larder_testkit::fixtures::{
    cook_json, cooks_page, following_json, profile_json, users_json,
};
use larder_testkit::{FailingStorage, Method, TestSession};

fn bob() -> Username {
    Username::new("bob")
}

async fn started(following: &[&str]) -> TestSession {
    let t = TestSession::new();
    t.api.on(Method::Get, "/me/following", Ok(following_json(following)));
    t.session.start().await.unwrap();
    t
}

fn listed(users: &[larder::UserSummary], username: &str) -> bool {
    users
        .iter()
        .find(|u| u.username.as_str() == username)
        .map(|u| u.is_following)
        .unwrap_or_else(|| panic!("{username} not listed"))
}

#[tokio::test]
async fn follow_updates_profile_and_search_results() {
    let t = started(&["bobby"]).await;
    t.api
        .on(Method::Get, "/users/bob", Ok(profile_json("bob", 10, false)))
        .on(
            Method::Get,
            "/users/search?q=bo",
            Ok(users_json(&[("bob", false), ("bobby", true)])),
        );
    t.session.ensure_profile(&bob()).await.unwrap();
    t.session.search_users("bo").await.unwrap();

    t.session.follow(&bob()).await.unwrap();

    let profile = t.session.profile(&bob()).unwrap();
    assert!(profile.is_following);
    assert_eq!(profile.follower_count, 11);
    assert!(t.session.is_following(&bob()));
    let results = t.session.search_results();
    assert!(listed(&results, "bob"));
    assert!(listed(&results, "bobby"));
    assert_eq!(t.api.count(Method::Post, "/users/bob/follow"), 1);
}

#[tokio::test]
async fn failed_follow_rolls_back_everywhere() {
    let t = started(&[]).await;
    t.api
        .on(Method::Get, "/users/search?q=bob", Ok(users_json(&[("bob", false)])))
        .on(Method::Post, "/users/bob/follow", Err(LarderError::network("timeout")));
    t.session.search_users("bob").await.unwrap();

    let err = t.session.follow(&bob()).await.unwrap_err();

    assert_eq!(err, LarderError::network("timeout"));
    assert!(!t.session.is_following(&bob()));
    assert!(!listed(&t.session.search_results(), "bob"));
    let errors = t.notifier.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "follow");
}

#[tokio::test]
async fn unfollow_from_a_list_without_profile() {
    let t = started(&["bob"]).await;
    t.api.on(Method::Get, "/users/suggested", Ok(users_json(&[("bob", true)])));
    t.session.refresh_suggestions().await.unwrap();

    t.session.unfollow(&bob()).await.unwrap();
    assert!(!listed(&t.session.suggested_friends(), "bob"));
    assert_eq!(t.api.count(Method::Delete, "/users/bob/follow"), 1);

    // Already unfollowed: nothing to send.
    t.session.unfollow(&bob()).await.unwrap();
    assert_eq!(t.api.count(Method::Delete, "/users/bob/follow"), 1);
}

#[tokio::test]
async fn block_drops_an_existing_follow() {
    let t = started(&["bob"]).await;
    t.api.on(Method::Get, "/users/bob", Ok(profile_json("bob", 10, true)));
    t.session.ensure_profile(&bob()).await.unwrap();

    t.session.block(&bob()).await.unwrap();

    let profile = t.session.profile(&bob()).unwrap();
    assert!(profile.is_blocked);
    assert!(!profile.is_following);
    assert_eq!(profile.follower_count, 9);
    assert!(!t.session.is_following(&bob()));
    assert_eq!(t.api.count(Method::Post, "/users/bob/block"), 1);
}

#[tokio::test]
async fn failed_block_restores_follow() {
    let t = started(&["bob"]).await;
    t.api
        .on(Method::Get, "/users/bob", Ok(profile_json("bob", 10, true)))
        .on(Method::Post, "/users/bob/block", Err(LarderError::Permission("no".into())));
    t.session.ensure_profile(&bob()).await.unwrap();

    assert!(t.session.block(&bob()).await.is_err());

    let profile = t.session.profile(&bob()).unwrap();
    assert!(!profile.is_blocked);
    assert!(profile.is_following);
    assert_eq!(profile.follower_count, 10);
    assert!(t.session.is_following(&bob()));
}

#[tokio::test]
async fn block_requires_a_loaded_profile() {
    let t = started(&[]).await;
    let err = t.session.block(&bob()).await.unwrap_err();
    assert_eq!(err, LarderError::NotFound("profile:bob".into()));
    assert_eq!(t.api.count(Method::Post, "/users/bob/block"), 0);
}

#[tokio::test]
async fn failed_delete_puts_cook_back_in_place() {
    let t = TestSession::new();
    t.api
        .on(Method::Get, "/feed?page=1", Ok(cooks_page("alice", 1, 3)))
        .on(Method::Delete, "/cooks/2", Err(LarderError::Permission("not yours".into())));
    t.session.load_first_page(&FeedKey::Home).await.unwrap();

    let err = t.session.delete_cook(&CookId::new("2")).await.unwrap_err();

    assert!(matches!(err, LarderError::Permission(_)));
    let ids: Vec<String> = t
        .session
        .feed_ids(&FeedKey::Home)
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(ids, ["1", "2", "3"]);
    assert!(t.session.cook(&CookId::new("2")).is_some());
    assert_eq!(t.notifier.error_count(), 1);
}

#[tokio::test]
async fn delete_removes_cook_from_every_feed() {
    let t = TestSession::new();
    t.api
        .on(Method::Get, "/feed?page=1", Ok(cooks_page("alice", 1, 3)))
        .on(Method::Get, "/users/alice/cooks?page=1", Ok(cooks_page("alice", 2, 2)));
    let alice = FeedKey::User(Username::new("alice"));
    t.session.load_first_page(&FeedKey::Home).await.unwrap();
    t.session.load_first_page(&alice).await.unwrap();

    t.session.delete_cook(&CookId::new("2")).await.unwrap();

    assert_eq!(t.session.feed_ids(&FeedKey::Home).len(), 2);
    assert_eq!(t.session.feed_ids(&alice), vec![CookId::new("3")]);
    assert!(t.session.cook(&CookId::new("2")).is_none());
    assert_eq!(t.notifier.successes(), vec!["Cook deleted".to_string()]);
}

#[tokio::test]
async fn edit_notes_sends_only_the_edit() {
    let t = started(&[]).await;
    t.api.on(Method::Get, "/cooks/42", Ok(cook_json("42", "alice", 0, false)));
    let id = CookId::new("42");
    t.session.ensure_cook(&id).await.unwrap();
    t.session.set_draft_notes(&id, "crispier");

    t.session.edit_notes(&id, "crispier").await.unwrap();

    assert_eq!(t.session.cook(&id).unwrap().notes, "crispier");
    assert!(t.session.draft_notes(&id).is_none());
    let put = t
        .api
        .requests()
        .into_iter()
        .find(|r| r.method == Method::Put)
        .unwrap();
    assert_eq!(put.path, "/cooks/42");
    assert_eq!(put.body, Some(json!({ "notes": "crispier" })));
}

#[tokio::test]
async fn edit_response_is_merged() {
    let t = TestSession::new();
    t.api
        .on(Method::Get, "/cooks/42", Ok(cook_json("42", "alice", 0, false)))
        .on(Method::Put, "/cooks/42", Ok(json!({ "notes": "crispier", "likeCount": 5 })));
    let id = CookId::new("42");
    t.session.ensure_cook(&id).await.unwrap();

    t.session.edit_notes(&id, "crispier").await.unwrap();
    assert_eq!(t.session.cook(&id).unwrap().like_count, 5);
}

#[tokio::test]
async fn invalid_edits_make_no_request() {
    let t = TestSession::with_config(SessionConfig {
        max_notes_len: 8,
        max_photos: 1,
        ..SessionConfig::default()
    });
    t.api.on(Method::Get, "/cooks/42", Ok(cook_json("42", "alice", 0, false)));
    let id = CookId::new("42");
    t.session.ensure_cook(&id).await.unwrap();

    let err = t.session.edit_notes(&id, "far too long").await.unwrap_err();
    assert_eq!(
        err,
        LarderError::Validation(ValidationError::TooLong {
            field: "notes",
            len: 12,
            max: 8
        })
    );

    let photos = vec![PhotoRef::new("https://a"), PhotoRef::new("https://b")];
    let err = t.session.edit_photos(&id, photos).await.unwrap_err();
    assert!(matches!(err, LarderError::Validation(ValidationError::TooMany { .. })));

    assert_eq!(t.api.count(Method::Put, "/cooks/42"), 0);
    assert_eq!(t.notifier.error_count(), 0);
    assert_eq!(t.session.cook(&id).unwrap().notes, "");
}

#[tokio::test(start_paused = true)]
async fn second_like_while_in_flight_is_rejected() {
    let t = TestSession::new();
    t.api.on(Method::Get, "/cooks/42", Ok(cook_json("42", "alice", 3, false)));
    let id = CookId::new("42");
    t.session.ensure_cook(&id).await.unwrap();
    t.api.set_latency(Duration::from_millis(100));

    let (first, second) = tokio::join!(t.session.like(&id), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        t.session.like(&id).await
    });

    assert!(first.is_ok());
    assert_eq!(
        second.unwrap_err(),
        LarderError::State(StateError::MutationInFlight {
            key: "cook:42".into(),
            action: "like",
        })
    );
    assert_eq!(t.api.count(Method::Post, "/cooks/42/like"), 1);
    assert_eq!(t.session.cook(&id).unwrap().like_count, 4);
}

#[tokio::test(start_paused = true)]
async fn unlike_while_like_in_flight_is_rejected() {
    let t = TestSession::new();
    t.api
        .on(Method::Get, "/cooks/42", Ok(cook_json("42", "alice", 3, false)))
        .on(Method::Post, "/cooks/42/like", Err(LarderError::network("503")))
        .on(Method::Delete, "/cooks/42/like", Err(LarderError::network("503")));
    let id = CookId::new("42");
    t.session.ensure_cook(&id).await.unwrap();
    t.api.set_latency(Duration::from_millis(100));

    let (like, unlike) = tokio::join!(t.session.like(&id), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        t.session.unlike(&id).await
    });

    assert_eq!(like.unwrap_err(), LarderError::network("503"));
    assert_eq!(
        unlike.unwrap_err(),
        LarderError::State(StateError::MutationInFlight {
            key: "cook:42".into(),
            action: "unlike",
        })
    );
    let cook = t.session.cook(&id).unwrap();
    assert_eq!((cook.like_count, cook.liked_by_me), (3, false));
    assert_eq!(t.api.count(Method::Delete, "/cooks/42/like"), 0);
    assert_eq!(t.notifier.error_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn unfollow_while_block_in_flight_is_rejected() {
    let t = started(&[]).await;
    t.api
        .on(Method::Get, "/users/bob", Ok(profile_json("bob", 10, false)))
        .on(Method::Post, "/users/bob/block", Err(LarderError::network("503")));
    t.session.ensure_profile(&bob()).await.unwrap();
    t.api.set_latency(Duration::from_millis(100));

    let bob_name = bob();
    let (block, unfollow) = tokio::join!(t.session.block(&bob_name), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        t.session.unfollow(&bob()).await
    });

    assert!(block.is_err());
    assert!(matches!(
        unfollow,
        Err(LarderError::State(StateError::MutationInFlight { action: "unfollow", .. }))
    ));
    assert!(!t.session.profile(&bob()).unwrap().is_blocked);
}

#[tokio::test]
async fn blank_search_clears_without_request() {
    let t = TestSession::new();
    t.api.on(Method::Get, "/users/search?q=ann", Ok(users_json(&[("ann", false)])));
    t.session.search_users("ann").await.unwrap();
    assert_eq!(t.session.search_results().len(), 1);

    assert!(t.session.search_users("   ").await.unwrap().is_empty());
    assert!(t.session.search_results().is_empty());
    assert_eq!(t.session.search_state(), LoadState::Idle);
    assert_eq!(t.api.total(), 1);
}

#[tokio::test(start_paused = true)]
async fn superseded_search_result_is_discarded() {
    let t = TestSession::new();
    t.api
        .on(Method::Get, "/users/search?q=a", Ok(users_json(&[("ann", false)])))
        .on(Method::Get, "/users/search?q=al", Ok(users_json(&[("alice", false)])));
    t.api.set_latency(Duration::from_millis(100));

    let (slow, fast) = tokio::join!(t.session.search_users("a"), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        t.session.search_users("al").await
    });

    assert!(slow.is_ok() && fast.is_ok());
    let results = t.session.search_results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].username.as_str(), "alice");
}

#[tokio::test(start_paused = true)]
async fn contacts_sync_refreshes_suggestions_once() {
    let t = started(&[]).await;
    t.api.on(Method::Get, "/users/suggested", Ok(users_json(&[("carol", false)])));

    t.session.mark_contacts_synced(1_700_000_000_000);
    tokio::time::sleep(Duration::from_millis(100)).await;
    t.session.mark_contacts_synced(1_700_000_000_500);
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(t.api.count(Method::Get, "/users/suggested"), 1);
    assert_eq!(t.session.suggested_friends().len(), 1);
    assert_eq!(
        t.storage.raw("larder:contacts_synced_at").as_deref(),
        Some("1700000000500")
    );
}

#[tokio::test(start_paused = true)]
async fn nothing_is_persisted_before_hydration() {
    let t = TestSession::new();
    t.session.set_draft_notes(&CookId::new("1"), "early");
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(t.storage.write_count(), 0);
    assert_eq!(t.session.draft_notes(&CookId::new("1")).as_deref(), Some("early"));
}

#[tokio::test(start_paused = true)]
async fn draft_before_start_survives_restart() {
    let t = TestSession::new();
    t.api.on(Method::Get, "/me/following", Ok(following_json(&[])));
    let id = CookId::new("1");

    t.session.set_draft_notes(&id, "early");
    t.session.start().await.unwrap();
    assert_eq!(t.session.draft_notes(&id).as_deref(), Some("early"));
    t.session.shutdown().await;
    assert_eq!(t.storage.raw("larder:draft_notes").as_deref(), Some(r#"{"1":"early"}"#));

    let restarted = t.restart();
    restarted.start().await.unwrap();
    assert_eq!(restarted.draft_notes(&id).as_deref(), Some("early"));
}

#[tokio::test(start_paused = true)]
async fn hydration_does_not_write_back() {
    let t = started(&[]).await;
    t.session.set_draft_notes(&CookId::new("1"), "kept");
    t.session.shutdown().await;
    let writes = t.storage.write_count();

    let restarted = t.restart();
    restarted.hydrate().await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(t.storage.write_count(), writes);
}

#[tokio::test(start_paused = true)]
async fn storage_failures_stay_local() {
    let t = TestSession::new();
    t.api.on(Method::Get, "/me/following", Ok(following_json(&["bob"])));
    let session = Session::new(
        Services::new(t.api.clone(), Arc::new(FailingStorage)),
        SessionConfig::default(),
    );

    session.start().await.unwrap();
    session.set_draft_notes(&CookId::new("1"), "offline draft");
    session.mark_contacts_synced(5);
    tokio::time::sleep(Duration::from_secs(1)).await;
    session.shutdown().await;

    assert_eq!(session.draft_notes(&CookId::new("1")).as_deref(), Some("offline draft"));
    assert_eq!(session.contacts_synced_at(), Some(5));
    assert!(session.is_following(&bob()));
}

#[tokio::test]
async fn failed_first_page_is_retryable() {
    let t = TestSession::new();
    t.api
        .once(Method::Get, "/feed?page=1", Err(LarderError::network("offline")))
        .on(Method::Get, "/feed?page=1", Ok(cooks_page("alice", 1, 2)));

    assert!(t.session.load_first_page(&FeedKey::Home).await.is_err());
    let feed = t.session.feed(&FeedKey::Home);
    assert_eq!(feed.error(), Some(LarderError::network("offline")));

    t.session.load_first_page(&FeedKey::Home).await.unwrap();
    assert_eq!(feed.status(), LoadState::Ready(2));
    assert!(!t.session.is_loading(&FeedKey::Home));
}
