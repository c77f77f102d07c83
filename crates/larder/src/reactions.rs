//! Session reactions: the "when X changes, do Y" rules.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use larder_core::Username;
use larder_sync::{paths, ApiClient, Reactor};

use crate::session::{fetch_user_list, SessionState, UserList};

/// Handles the reactions act on.
pub(crate) struct Wiring {
    pub api: Arc<dyn ApiClient>,
    pub search: Arc<UserList>,
    pub suggestions: Arc<UserList>,
    pub suggestions_debounce: Duration,
}

pub(crate) fn install(reactor: &Reactor<SessionState>, state: &Arc<SessionState>, wiring: Wiring) {
    let Wiring {
        api,
        search,
        suggestions,
        suggestions_debounce,
    } = wiring;

    // A contacts sync changes who we might know.
    let refresh = Arc::clone(&suggestions);
    reactor.watch_debounced(
        "refresh-suggestions",
        suggestions_debounce,
        |s: &SessionState| s.contacts_synced_at(),
        move |synced_at| {
            if synced_at.is_none() {
                return;
            }
            let Ok(handle) = tokio::runtime::Handle::try_current() else {
                tracing::warn!("no runtime, skipping suggestions refresh");
                return;
            };
            let api = Arc::clone(&api);
            let suggestions = Arc::clone(&refresh);
            handle.spawn(async move {
                let path = paths::suggested_users();
                if let Err(error) = suggestions.load(fetch_user_list(api.as_ref(), &path)).await {
                    tracing::warn!(%error, "suggestions refresh failed");
                }
            });
        },
    );

    // Keep `is_following` on listed users in line with the followed set.
    let previous = Mutex::new(state.following());
    reactor.watch(
        "following-overlay",
        |s: &SessionState| s.following(),
        move |following: BTreeSet<Username>| {
            let changed: BTreeSet<Username> = {
                let mut previous = previous.lock().unwrap_or_else(PoisonError::into_inner);
                let changed = previous.symmetric_difference(&following).cloned().collect();
                *previous = following.clone();
                changed
            };
            for list in [&search, &suggestions] {
                list.modify(|users| {
                    for user in users.iter_mut().filter(|u| changed.contains(&u.username)) {
                        user.is_following = following.contains(&user.username);
                    }
                });
            }
        },
    );

    let weak = Arc::downgrade(state);
    reactor.watch(
        "persist-contacts",
        |s: &SessionState| s.contacts_synced_at(),
        move |_| {
            if let Some(state) = Weak::upgrade(&weak) {
                state.contacts_slice().persist();
            }
        },
    );

    let weak = Arc::downgrade(state);
    reactor.watch(
        "persist-drafts",
        |s: &SessionState| s.drafts(),
        move |_| {
            if let Some(state) = Weak::upgrade(&weak) {
                state.drafts_slice().persist();
            }
        },
    );
}
