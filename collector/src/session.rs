use crate::registry::TrackedAccount;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        PoisonError,
    },
};

/// Session tokens obtained by signing in to private servers, kept across ticks.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    tokens: Arc<Mutex<HashMap<(String, String), String>>>,
}

impl SessionStore {
    fn key(account: &TrackedAccount) -> (String, String) {
        (account.host.to_string(), account.username.clone())
    }

    pub fn get(&self, account: &TrackedAccount) -> Option<String> {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&Self::key(account))
            .cloned()
    }

    pub fn store(&self, account: &TrackedAccount, token: String) {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(Self::key(account), token);
    }

    /// Drops the token of `account`, e.g. after the server rejected it.
    pub fn forget(&self, account: &TrackedAccount) -> bool {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&Self::key(account))
            .is_some()
    }
}
