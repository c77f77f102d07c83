//! Test fixtures and helpers.
//!
//! A scriptable API client, recording collaborators, JSON body builders and
//! a ready-wired session.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use larder::{Services, Session, SessionConfig};
use larder_core::{ImagePreloader, LarderError, Notifier, Result};
use larder_store::{KeyValueStorage, MemoryStorage, StoreError};
use larder_sync::ApiClient;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Install a test log subscriber filtered by `LARDER_LOG`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env(larder::telemetry::LOG_ENV)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock API
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// One request seen by [`MockApi`].
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

#[derive(Default)]
struct Route {
    queued: VecDeque<Result<Value>>,
    sticky: Option<Result<Value>>,
}

/// A scripted [`ApiClient`].
///
/// Unrouted `GET`s answer `NotFound`; unrouted writes answer `null`.
/// Requests are logged before the simulated latency elapses, so in-flight
/// requests are already counted.
#[derive(Default)]
pub struct MockApi {
    routes: Mutex<HashMap<(Method, String), Route>>,
    requests: Mutex<Vec<Request>>,
    latency: Mutex<Duration>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer every request to `(method, path)` with `response`.
    pub fn on(&self, method: Method, path: &str, response: Result<Value>) -> &Self {
        lock(&self.routes)
            .entry((method, path.to_string()))
            .or_default()
            .sticky = Some(response);
        self
    }

    /// Answer the next request to `(method, path)` with `response`, ahead
    /// of any sticky response.
    pub fn once(&self, method: Method, path: &str, response: Result<Value>) -> &Self {
        lock(&self.routes)
            .entry((method, path.to_string()))
            .or_default()
            .queued
            .push_back(response);
        self
    }

    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    pub fn requests(&self) -> Vec<Request> {
        lock(&self.requests).clone()
    }

    /// Requests made to exactly `(method, path)`.
    pub fn count(&self, method: Method, path: &str) -> usize {
        lock(&self.requests)
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn total(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn clear_requests(&self) {
        lock(&self.requests).clear();
    }

    async fn respond(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        lock(&self.requests).push(Request {
            method,
            path: path.to_string(),
            body,
        });

        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut routes = lock(&self.routes);
        let scripted = routes.get_mut(&(method, path.to_string())).and_then(|route| {
            route.queued.pop_front().or_else(|| route.sticky.clone())
        });
        match scripted {
            Some(response) => response,
            None if method == Method::Get => Err(LarderError::NotFound(path.to_string())),
            None => Ok(Value::Null),
        }
    }
}

#[async_trait]
impl ApiClient for MockApi {
    async fn get(&self, path: &str) -> Result<Value> {
        self.respond(Method::Get, path, None).await
    }

    async fn post(&self, path: &str, body: Option<Value>) -> Result<Value> {
        self.respond(Method::Post, path, body).await
    }

    async fn put(&self, path: &str, body: Option<Value>) -> Result<Value> {
        self.respond(Method::Put, path, body).await
    }

    async fn delete(&self, path: &str) -> Result<Value> {
        self.respond(Method::Delete, path, None).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Recording collaborators
// ─────────────────────────────────────────────────────────────────────────────

/// Notifier that keeps every notification.
#[derive(Default)]
pub struct RecordingNotifier {
    successes: Mutex<Vec<String>>,
    errors: Mutex<Vec<(String, LarderError)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn successes(&self) -> Vec<String> {
        lock(&self.successes).clone()
    }

    /// `(action, error)` pairs in arrival order.
    pub fn errors(&self) -> Vec<(String, LarderError)> {
        lock(&self.errors).clone()
    }

    pub fn error_count(&self) -> usize {
        lock(&self.errors).len()
    }
}

impl Notifier for RecordingNotifier {
    fn success(&self, message: &str) {
        lock(&self.successes).push(message.to_string());
    }

    fn error(&self, action: &str, error: &LarderError) {
        lock(&self.errors).push((action.to_string(), error.clone()));
    }
}

/// Preloader that keeps every requested url.
#[derive(Default)]
pub struct RecordingPreloader {
    urls: Mutex<Vec<String>>,
}

impl RecordingPreloader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn urls(&self) -> Vec<String> {
        lock(&self.urls).clone()
    }
}

impl ImagePreloader for RecordingPreloader {
    fn preload(&self, urls: &[String]) {
        lock(&self.urls).extend(urls.iter().cloned());
    }
}

/// Storage where every operation fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingStorage;

#[async_trait]
impl KeyValueStorage for FailingStorage {
    async fn get(&self, _key: &str) -> larder_store::Result<Option<String>> {
        Err(StoreError::Unavailable("disk unplugged".into()))
    }

    async fn set(&self, _key: &str, _value: String) -> larder_store::Result<()> {
        Err(StoreError::Unavailable("disk unplugged".into()))
    }

    async fn remove(&self, _key: &str) -> larder_store::Result<()> {
        Err(StoreError::Unavailable("disk unplugged".into()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON bodies
// ─────────────────────────────────────────────────────────────────────────────

/// A cook body as the API returns it.
pub fn cook_json(id: &str, author: &str, like_count: u32, liked_by_me: bool) -> Value {
    json!({
        "id": id,
        "author": { "username": author },
        "recipe": { "id": format!("r-{id}"), "title": "Shakshuka" },
        "notes": "",
        "photos": [{ "url": format!("https://img.example/{id}.jpg") }],
        "likeCount": like_count,
        "likedByMe": liked_by_me,
        "createdAt": 1_700_000_000_000i64,
    })
}

/// A page body wrapping `results`.
pub fn page_json(results: Vec<Value>) -> Value {
    json!({ "results": results })
}

/// A page of `count` cooks by `author` with ids `{first}..{first + count}`.
pub fn cooks_page(author: &str, first: usize, count: usize) -> Value {
    page_json(
        (first..first + count)
            .map(|n| cook_json(&n.to_string(), author, 0, false))
            .collect(),
    )
}

pub fn profile_json(username: &str, follower_count: u32, is_following: bool) -> Value {
    json!({
        "username": username,
        "displayName": username.to_uppercase(),
        "avatarUrl": format!("https://img.example/avatars/{username}.jpg"),
        "followerCount": follower_count,
        "isFollowing": is_following,
        "isBlocked": false,
        "isPrivate": false,
    })
}

/// A user list body from `(username, is_following)` pairs.
pub fn users_json(users: &[(&str, bool)]) -> Value {
    page_json(
        users
            .iter()
            .map(|(username, is_following)| {
                json!({ "username": username, "isFollowing": is_following })
            })
            .collect(),
    )
}

pub fn following_json(usernames: &[&str]) -> Value {
    json!({ "usernames": usernames })
}

// ─────────────────────────────────────────────────────────────────────────────
// Session fixture
// ─────────────────────────────────────────────────────────────────────────────

/// A session over a mock API and in-memory storage.
pub struct TestSession {
    pub api: Arc<MockApi>,
    pub storage: Arc<MemoryStorage>,
    pub notifier: Arc<RecordingNotifier>,
    pub preloader: Arc<RecordingPreloader>,
    pub config: SessionConfig,
    pub session: Session,
}

impl TestSession {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        init_tracing();
        let api = MockApi::new();
        let storage = Arc::new(MemoryStorage::new());
        let notifier = RecordingNotifier::new();
        let preloader = RecordingPreloader::new();
        let session = build(&api, &storage, &notifier, &preloader, &config);
        Self {
            api,
            storage,
            notifier,
            preloader,
            config,
            session,
        }
    }

    /// A fresh session over the same API and storage, as after an app restart.
    pub fn restart(&self) -> Session {
        build(
            &self.api,
            &self.storage,
            &self.notifier,
            &self.preloader,
            &self.config,
        )
    }
}

impl Default for TestSession {
    fn default() -> Self {
        Self::new()
    }
}

fn build(
    api: &Arc<MockApi>,
    storage: &Arc<MemoryStorage>,
    notifier: &Arc<RecordingNotifier>,
    preloader: &Arc<RecordingPreloader>,
    config: &SessionConfig,
) -> Session {
    let services = Services::new(api.clone(), storage.clone())
        .with_notifier(notifier.clone())
        .with_preloader(preloader.clone());
    Session::new(services, config.clone())
}
