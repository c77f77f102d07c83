//! Decode/encode boundary between API bodies and records.
//!
//! API bodies are camelCase JSON. Nothing outside this module knows how a
//! field is spelled on the wire.
//!
//! ```text
//! cook:     {"id", "author": {"username"}, "recipe"?: {"id", "title"},
//!            "notes"?, "photos"?: [{"url"}], "likeCount"?, "likedByMe"?, "createdAt"?}
//! page:     {"results": [cook, ...]}
//! profile:  {"username", "displayName"?, "avatarUrl"?, "followerCount"?,
//!            "isFollowing"?, "isBlocked"?, "isPrivate"?}
//! users:    {"results": [{"username", "displayName"?, "avatarUrl"?, "isFollowing"?}]}
//! following:{"usernames": ["alice", ...]}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::ids::{CookId, PhotoRef, RecipeId, Username};
use crate::record::{Cook, CookPatch, RecipeRef, UserProfile, UserSummary};

type Result<T> = std::result::Result<T, ValidationError>;

#[derive(Debug, Deserialize)]
struct AuthorWire {
    username: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecipeWire {
    id: String,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct PhotoWire {
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CookWire {
    id: String,
    author: AuthorWire,
    #[serde(default)]
    recipe: Option<RecipeWire>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    photos: Vec<PhotoWire>,
    #[serde(default)]
    like_count: u32,
    #[serde(default)]
    liked_by_me: bool,
    #[serde(default)]
    created_at: i64,
}

/// Partial cook body, as returned by edit endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CookPatchWire {
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    photos: Option<Vec<PhotoWire>>,
    #[serde(default)]
    like_count: Option<u32>,
    #[serde(default)]
    liked_by_me: Option<bool>,
}

#[derive(Debug, Serialize, Default)]
struct CookEditWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    photos: Option<Vec<PhotoWire>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recipe: Option<Option<RecipeWire>>,
}

#[derive(Debug, Deserialize)]
struct PageWire<T> {
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileWire {
    username: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default)]
    follower_count: u32,
    #[serde(default)]
    is_following: bool,
    #[serde(default)]
    is_blocked: bool,
    #[serde(default)]
    is_private: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserSummaryWire {
    username: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default)]
    is_following: bool,
}

#[derive(Debug, Deserialize)]
struct FollowingWire {
    usernames: Vec<String>,
}

fn parse<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| ValidationError::Malformed(e.to_string()))
}

fn non_empty(field: &'static str, value: String) -> Result<String> {
    if value.trim().is_empty() {
        Err(ValidationError::Empty { field })
    } else {
        Ok(value)
    }
}

fn photos_from_wire(photos: Vec<PhotoWire>) -> Vec<PhotoRef> {
    photos.into_iter().map(|p| PhotoRef::new(p.url)).collect()
}

impl TryFrom<CookWire> for Cook {
    type Error = ValidationError;

    fn try_from(wire: CookWire) -> Result<Self> {
        Ok(Cook {
            id: CookId::new(non_empty("id", wire.id)?),
            author: Username::new(non_empty("author.username", wire.author.username)?),
            recipe: wire.recipe.map(|r| RecipeRef {
                id: RecipeId::new(r.id),
                title: r.title,
            }),
            notes: wire.notes.unwrap_or_default(),
            photos: photos_from_wire(wire.photos),
            like_count: wire.like_count,
            liked_by_me: wire.liked_by_me,
            created_at: wire.created_at,
        })
    }
}

impl TryFrom<ProfileWire> for UserProfile {
    type Error = ValidationError;

    fn try_from(wire: ProfileWire) -> Result<Self> {
        let username = non_empty("username", wire.username)?;
        Ok(UserProfile {
            display_name: wire.display_name.unwrap_or_else(|| username.clone()),
            username: Username::new(username),
            avatar: wire.avatar_url.map(PhotoRef::new),
            follower_count: wire.follower_count,
            is_following: wire.is_following,
            is_blocked: wire.is_blocked,
            is_private: wire.is_private,
        })
    }
}

impl TryFrom<UserSummaryWire> for UserSummary {
    type Error = ValidationError;

    fn try_from(wire: UserSummaryWire) -> Result<Self> {
        let username = non_empty("username", wire.username)?;
        Ok(UserSummary {
            display_name: wire.display_name.unwrap_or_else(|| username.clone()),
            username: Username::new(username),
            avatar: wire.avatar_url.map(PhotoRef::new),
            is_following: wire.is_following,
        })
    }
}

/// Decode a full cook body.
pub fn decode_cook(value: Value) -> Result<Cook> {
    Cook::try_from(parse::<CookWire>(value)?)
}

/// Decode a partial cook body into a merge patch.
///
/// A null or empty body decodes to an empty patch.
pub fn decode_cook_patch(value: Value) -> Result<CookPatch> {
    if value.is_null() {
        return Ok(CookPatch::default());
    }
    let wire = parse::<CookPatchWire>(value)?;
    Ok(CookPatch {
        recipe: None,
        notes: wire.notes,
        photos: wire.photos.map(photos_from_wire),
        like_count: wire.like_count,
        liked_by_me: wire.liked_by_me,
    })
}

/// Decode a page of cooks.
pub fn decode_cook_page(value: Value) -> Result<Vec<Cook>> {
    parse::<PageWire<CookWire>>(value)?
        .results
        .into_iter()
        .map(Cook::try_from)
        .collect()
}

/// Decode a profile body.
pub fn decode_profile(value: Value) -> Result<UserProfile> {
    UserProfile::try_from(parse::<ProfileWire>(value)?)
}

/// Decode a list of user rows.
pub fn decode_user_list(value: Value) -> Result<Vec<UserSummary>> {
    parse::<PageWire<UserSummaryWire>>(value)?
        .results
        .into_iter()
        .map(UserSummary::try_from)
        .collect()
}

/// Decode the followed-usernames body.
pub fn decode_following(value: Value) -> Result<Vec<Username>> {
    Ok(parse::<FollowingWire>(value)?
        .usernames
        .into_iter()
        .filter(|u| !u.is_empty())
        .map(Username::new)
        .collect())
}

/// Encode the editable fields of a patch as a request body.
pub fn encode_cook_edit(patch: &CookPatch) -> Value {
    let edit = CookEditWire {
        notes: patch.notes.clone(),
        photos: patch.photos.as_ref().map(|photos| {
            photos
                .iter()
                .map(|p| PhotoWire {
                    url: p.as_str().to_string(),
                })
                .collect()
        }),
        recipe: patch.recipe.as_ref().map(|recipe| {
            recipe.as_ref().map(|r| RecipeWire {
                id: r.id.as_str().to_string(),
                title: r.title.clone(),
            })
        }),
    };
    // Plain structs of strings always serialize.
    serde_json::to_value(edit).unwrap_or(Value::Null)
}
