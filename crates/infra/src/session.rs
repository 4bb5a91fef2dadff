//! Bearer session tokens.
//!
//! A login issues an opaque random token; the transport layer resolves it back
//! to the user before any core logic runs. Sessions live only in memory.

use std::collections::HashMap;
use std::sync::RwLock;

use invoicer_auth::generate_token;
use invoicer_core::{DomainError, DomainResult, UserId};

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, UserId>>,
}

fn poisoned() -> DomainError {
    DomainError::external("session store unavailable")
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session for `user_id` and return its bearer token.
    pub fn issue(&self, user_id: UserId) -> DomainResult<String> {
        let token = generate_token();
        self.sessions
            .write()
            .map_err(|_| poisoned())?
            .insert(token.clone(), user_id);
        Ok(token)
    }

    pub fn resolve(&self, token: &str) -> DomainResult<Option<UserId>> {
        Ok(self.sessions.read().map_err(|_| poisoned())?.get(token).copied())
    }

    /// Returns whether a session was closed.
    pub fn revoke(&self, token: &str) -> DomainResult<bool> {
        Ok(self.sessions.write().map_err(|_| poisoned())?.remove(token).is_some())
    }

    /// Close every session of a user (deleted or deactivated accounts).
    pub fn revoke_user(&self, user_id: UserId) -> DomainResult<usize> {
        let mut sessions = self.sessions.write().map_err(|_| poisoned())?;
        let before = sessions.len();
        sessions.retain(|_, owner| *owner != user_id);
        Ok(before - sessions.len())
    }
}
