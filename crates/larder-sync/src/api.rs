//! Remote API boundary.
//!
//! The API client is a collaborator: it owns transport, auth headers,
//! timeouts and retries, and hands back parsed JSON bodies. Everything here
//! decodes those bodies through `larder_core::wire`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use larder_core::wire;
use larder_core::{Cook, CookId, Result, UserProfile, Username};
use larder_store::EntityFetcher;

use crate::feed::PageSource;

/// The remote API.
///
/// Implementations map transport failures and non-2xx statuses to
/// `LarderError` (`Network`, `NotFound`, `Permission`).
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn get(&self, path: &str) -> Result<Value>;

    async fn post(&self, path: &str, body: Option<Value>) -> Result<Value>;

    async fn put(&self, path: &str, body: Option<Value>) -> Result<Value>;

    async fn delete(&self, path: &str) -> Result<Value>;
}

/// Endpoint paths.
pub mod paths {
    use larder_core::{CookId, Username};

    pub fn cook(id: &CookId) -> String {
        format!("/cooks/{}", urlencoding::encode(id.as_str()))
    }

    pub fn cook_like(id: &CookId) -> String {
        format!("{}/like", cook(id))
    }

    pub fn home_feed(page: u32) -> String {
        format!("/feed?page={}", page)
    }

    pub fn user_cooks(username: &Username, page: u32) -> String {
        format!("{}/cooks?page={}", profile(username), page)
    }

    pub fn profile(username: &Username) -> String {
        format!("/users/{}", urlencoding::encode(username.as_str()))
    }

    pub fn follow(username: &Username) -> String {
        format!("{}/follow", profile(username))
    }

    pub fn block(username: &Username) -> String {
        format!("{}/block", profile(username))
    }

    pub fn search_users(query: &str) -> String {
        format!("/users/search?q={}", urlencoding::encode(query))
    }

    pub fn suggested_users() -> String {
        "/users/suggested".to_string()
    }

    pub fn following() -> String {
        "/me/following".to_string()
    }
}

/// Fetches full cook records.
pub struct CookFetcher {
    api: Arc<dyn ApiClient>,
}

impl CookFetcher {
    pub fn new(api: Arc<dyn ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl EntityFetcher<Cook> for CookFetcher {
    async fn fetch(&self, id: &CookId) -> Result<Cook> {
        let body = self.api.get(&paths::cook(id)).await?;
        Ok(wire::decode_cook(body)?)
    }
}

/// Fetches profile records.
pub struct ProfileFetcher {
    api: Arc<dyn ApiClient>,
}

impl ProfileFetcher {
    pub fn new(api: Arc<dyn ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl EntityFetcher<UserProfile> for ProfileFetcher {
    async fn fetch(&self, username: &Username) -> Result<UserProfile> {
        let body = self.api.get(&paths::profile(username)).await?;
        Ok(wire::decode_profile(body)?)
    }
}

/// Pages of the session user's home feed.
pub struct HomeFeedSource {
    api: Arc<dyn ApiClient>,
}

impl HomeFeedSource {
    pub fn new(api: Arc<dyn ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PageSource for HomeFeedSource {
    async fn fetch_page(&self, page: u32) -> Result<Vec<Cook>> {
        let body = self.api.get(&paths::home_feed(page)).await?;
        Ok(wire::decode_cook_page(body)?)
    }
}

/// Pages of one user's cooks.
pub struct UserCooksSource {
    api: Arc<dyn ApiClient>,
    username: Username,
}

impl UserCooksSource {
    pub fn new(api: Arc<dyn ApiClient>, username: Username) -> Self {
        Self { api, username }
    }
}

#[async_trait]
impl PageSource for UserCooksSource {
    async fn fetch_page(&self, page: u32) -> Result<Vec<Cook>> {
        let body = self.api.get(&paths::user_cooks(&self.username, page)).await?;
        Ok(wire::decode_cook_page(body)?)
    }
}
