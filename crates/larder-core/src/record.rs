//! Domain records and their patches.

use crate::entity::Entity;
use crate::ids::{CookId, PhotoRef, RecipeId, Username};

/// A reference to the recipe a cook was made from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeRef {
    pub id: RecipeId,
    pub title: String,
}

/// A cook entry: one person's take on a recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cook {
    pub id: CookId,
    pub author: Username,
    pub recipe: Option<RecipeRef>,
    pub notes: String,
    pub photos: Vec<PhotoRef>,
    pub like_count: u32,
    pub liked_by_me: bool,
    /// Creation time (Unix ms).
    pub created_at: i64,
}

/// Partial update of a [`Cook`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookPatch {
    pub recipe: Option<Option<RecipeRef>>,
    pub notes: Option<String>,
    pub photos: Option<Vec<PhotoRef>>,
    pub like_count: Option<u32>,
    pub liked_by_me: Option<bool>,
}

impl CookPatch {
    pub fn notes(notes: impl Into<String>) -> Self {
        Self {
            notes: Some(notes.into()),
            ..Self::default()
        }
    }

    pub fn photos(photos: Vec<PhotoRef>) -> Self {
        Self {
            photos: Some(photos),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl Cook {
    /// The patch that moves this cook into the given liked state, or `None`
    /// if it is already there.
    pub fn like_patch(&self, liked: bool) -> Option<CookPatch> {
        if self.liked_by_me == liked {
            return None;
        }
        let like_count = if liked {
            self.like_count.saturating_add(1)
        } else {
            self.like_count.saturating_sub(1)
        };
        Some(CookPatch {
            like_count: Some(like_count),
            liked_by_me: Some(liked),
            ..CookPatch::default()
        })
    }
}

impl Entity for Cook {
    type Id = CookId;
    type Patch = CookPatch;

    const KIND: &'static str = "cook";

    fn id(&self) -> &CookId {
        &self.id
    }

    fn apply(&mut self, patch: &CookPatch) {
        if let Some(recipe) = &patch.recipe {
            self.recipe = recipe.clone();
        }
        if let Some(notes) = &patch.notes {
            self.notes = notes.clone();
        }
        if let Some(photos) = &patch.photos {
            self.photos = photos.clone();
        }
        if let Some(like_count) = patch.like_count {
            self.like_count = like_count;
        }
        if let Some(liked_by_me) = patch.liked_by_me {
            self.liked_by_me = liked_by_me;
        }
    }

    fn capture(&self, patch: &CookPatch) -> CookPatch {
        CookPatch {
            recipe: patch.recipe.as_ref().map(|_| self.recipe.clone()),
            notes: patch.notes.as_ref().map(|_| self.notes.clone()),
            photos: patch.photos.as_ref().map(|_| self.photos.clone()),
            like_count: patch.like_count.map(|_| self.like_count),
            liked_by_me: patch.liked_by_me.map(|_| self.liked_by_me),
        }
    }

    fn image_urls(&self) -> Vec<String> {
        self.photos.iter().map(|p| p.as_str().to_string()).collect()
    }
}

/// A user profile as shown on a profile page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub username: Username,
    pub display_name: String,
    pub avatar: Option<PhotoRef>,
    pub follower_count: u32,
    pub is_following: bool,
    pub is_blocked: bool,
    pub is_private: bool,
}

/// Partial update of a [`UserProfile`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub display_name: Option<String>,
    pub avatar: Option<Option<PhotoRef>>,
    pub follower_count: Option<u32>,
    pub is_following: Option<bool>,
    pub is_blocked: Option<bool>,
}

impl UserProfile {
    /// The patch that moves this profile into the given following state.
    pub fn follow_patch(&self, following: bool) -> Option<UserPatch> {
        if self.is_following == following {
            return None;
        }
        let follower_count = if following {
            self.follower_count.saturating_add(1)
        } else {
            self.follower_count.saturating_sub(1)
        };
        Some(UserPatch {
            follower_count: Some(follower_count),
            is_following: Some(following),
            ..UserPatch::default()
        })
    }

    /// The patch that moves this profile into the given blocked state.
    ///
    /// Blocking also drops an existing follow.
    pub fn block_patch(&self, blocked: bool) -> Option<UserPatch> {
        if self.is_blocked == blocked {
            return None;
        }
        let mut patch = UserPatch {
            is_blocked: Some(blocked),
            ..UserPatch::default()
        };
        if blocked && self.is_following {
            patch.is_following = Some(false);
            patch.follower_count = Some(self.follower_count.saturating_sub(1));
        }
        Some(patch)
    }
}

impl Entity for UserProfile {
    type Id = Username;
    type Patch = UserPatch;

    const KIND: &'static str = "profile";

    fn id(&self) -> &Username {
        &self.username
    }

    fn apply(&mut self, patch: &UserPatch) {
        if let Some(display_name) = &patch.display_name {
            self.display_name = display_name.clone();
        }
        if let Some(avatar) = &patch.avatar {
            self.avatar = avatar.clone();
        }
        if let Some(follower_count) = patch.follower_count {
            self.follower_count = follower_count;
        }
        if let Some(is_following) = patch.is_following {
            self.is_following = is_following;
        }
        if let Some(is_blocked) = patch.is_blocked {
            self.is_blocked = is_blocked;
        }
    }

    fn capture(&self, patch: &UserPatch) -> UserPatch {
        UserPatch {
            display_name: patch.display_name.as_ref().map(|_| self.display_name.clone()),
            avatar: patch.avatar.as_ref().map(|_| self.avatar.clone()),
            follower_count: patch.follower_count.map(|_| self.follower_count),
            is_following: patch.is_following.map(|_| self.is_following),
            is_blocked: patch.is_blocked.map(|_| self.is_blocked),
        }
    }

    fn image_urls(&self) -> Vec<String> {
        self.avatar
            .iter()
            .map(|a| a.as_str().to_string())
            .collect()
    }
}

/// A row in search results or suggested friends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub username: Username,
    pub display_name: String,
    pub avatar: Option<PhotoRef>,
    pub is_following: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cook(likes: u32, liked: bool) -> Cook {
        Cook {
            id: CookId::new("42"),
            author: Username::new("alice"),
            recipe: None,
            notes: "salty".into(),
            photos: vec![PhotoRef::new("https://img/1.jpg")],
            like_count: likes,
            liked_by_me: liked,
            created_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_like_patch() {
        let patch = cook(3, false).like_patch(true).unwrap();
        assert_eq!(patch.like_count, Some(4));
        assert_eq!(patch.liked_by_me, Some(true));
        assert!(cook(3, true).like_patch(true).is_none());
    }

    #[test]
    fn test_capture_touches_only_patched_fields() {
        let original = cook(3, false);
        let patch = original.like_patch(true).unwrap();
        let snapshot = original.capture(&patch);

        assert_eq!(snapshot.like_count, Some(3));
        assert_eq!(snapshot.liked_by_me, Some(false));
        assert!(snapshot.notes.is_none());
        assert!(snapshot.photos.is_none());

        let mut changed = original.clone();
        changed.apply(&patch);
        // An unrelated concurrent edit must survive the rollback.
        changed.apply(&CookPatch::notes("sweet"));
        changed.apply(&snapshot);
        assert_eq!(changed.like_count, 3);
        assert!(!changed.liked_by_me);
        assert_eq!(changed.notes, "sweet");
    }

    #[test]
    fn test_block_drops_follow() {
        let profile = UserProfile {
            username: Username::new("bob"),
            display_name: "Bob".into(),
            avatar: None,
            follower_count: 10,
            is_following: true,
            is_blocked: false,
            is_private: false,
        };
        let patch = profile.block_patch(true).unwrap();
        assert_eq!(patch.is_blocked, Some(true));
        assert_eq!(patch.is_following, Some(false));
        assert_eq!(patch.follower_count, Some(9));
    }
}
