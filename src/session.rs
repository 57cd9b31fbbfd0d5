//! Session token access.
//!
//! The data layer only ever *reads* the bearer token, through [`SessionReader`].
//! Whatever owns the login flow (restore from storage, login, logout) writes it,
//! typically into a [`SessionStore`] shared with the [`Api`](crate::api::Api).

use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

/// Synchronous, call-time read of the current bearer token.
///
/// Implementations must return the value as of *now*; callers never cache it across
/// requests.
pub trait SessionReader: Send + Sync {
    fn token(&self) -> Option<String>;
}

impl<F> SessionReader for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn token(&self) -> Option<String> {
        self()
    }
}

/// In-memory token holder. Clones share the same slot.
///
/// Writes are whole-value replacements; a request already in flight keeps the token
/// it captured.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    token: Arc<RwLock<Option<String>>>,
}

impl SessionStore {
    /// A logged-out session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A session restored with `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store.set_token(token);
        store
    }

    /// Login or restore-from-storage.
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
        debug!("session token set");
    }

    /// Logout.
    pub fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
        debug!("session token cleared");
    }

    pub fn is_logged_in(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl SessionReader for SessionStore {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
