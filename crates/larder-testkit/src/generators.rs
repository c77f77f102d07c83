//! Proptest generators for property-based testing.

use proptest::prelude::*;

use larder_core::{Cook, CookId, PhotoRef, RecipeId, RecipeRef, Username};

/// A lowercase username.
pub fn username() -> impl Strategy<Value = Username> {
    "[a-z][a-z0-9_]{2,11}".prop_map(Username::new)
}

/// A cook id from a small space, so collisions are common.
pub fn cook_id(space: u32) -> impl Strategy<Value = CookId> {
    (0..space).prop_map(|n| CookId::new(n.to_string()))
}

/// Free-text notes of at most `max_len` characters.
pub fn notes(max_len: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(any::<char>(), 0..=max_len).prop_map(|chars| chars.into_iter().collect())
}

pub fn photos(max: usize) -> impl Strategy<Value = Vec<PhotoRef>> {
    prop::collection::vec(
        "[a-z0-9]{4,8}".prop_map(|name| PhotoRef::new(format!("https://img.example/{name}.jpg"))),
        0..=max,
    )
}

/// A complete cook record.
pub fn cook() -> impl Strategy<Value = Cook> {
    (
        cook_id(10_000),
        username(),
        prop::option::of("[A-Za-z ]{3,20}"),
        notes(64),
        photos(4),
        0u32..1_000,
        any::<bool>(),
        0i64..=i64::MAX / 2,
    )
        .prop_map(
            |(id, author, recipe, notes, photos, like_count, liked_by_me, created_at)| Cook {
                recipe: recipe.map(|title| RecipeRef {
                    id: RecipeId::new(format!("r-{id}")),
                    title,
                }),
                id,
                author,
                notes,
                photos,
                like_count,
                liked_by_me,
                created_at,
            },
        )
}

/// Pages of ids drawn from `0..space`. Every page is non-empty.
pub fn overlapping_pages(
    max_pages: usize,
    max_len: usize,
    space: u32,
) -> impl Strategy<Value = Vec<Vec<String>>> {
    prop::collection::vec(
        prop::collection::vec((0..space).prop_map(|n| n.to_string()), 1..=max_len),
        1..=max_pages,
    )
}
