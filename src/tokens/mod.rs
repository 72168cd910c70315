//! Token storage over the secure key-value store.
//!
//! Owns exactly two secrets (access token, refresh token) plus the
//! derived authentication state. No other component writes these keys.

use std::sync::Arc;

use log::warn;

use crate::constants::{
    ACCESS_TOKEN_KEY, BIOMETRIC_ENABLED_KEY, CACHED_GOALS_KEY, PENDING_CHANGES_KEY,
    REFRESH_TOKEN_KEY, USER_DATA_KEY, USER_EMAIL_KEY, USER_ID_KEY,
};
use crate::errors::Result;
use crate::secrets::SecretStore;

/// Every key the client owns, cleared wholesale on logout.
const ALL_KEYS: &[&str] = &[
    ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    USER_ID_KEY,
    USER_EMAIL_KEY,
    USER_DATA_KEY,
    CACHED_GOALS_KEY,
    PENDING_CHANGES_KEY,
    BIOMETRIC_ENABLED_KEY,
];

/// Access/refresh token pair over an opaque secure store.
#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn SecretStore>,
}

impl TokenStore {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    /// Persist both tokens. Two sequential writes; the underlying store
    /// has no transaction guarantee.
    pub fn save_tokens(&self, access: &str, refresh: &str) -> Result<()> {
        self.store.set(ACCESS_TOKEN_KEY, access)?;
        self.store.set(REFRESH_TOKEN_KEY, refresh)
    }

    pub fn access_token(&self) -> Result<Option<String>> {
        self.store.get(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Result<Option<String>> {
        self.store.get(REFRESH_TOKEN_KEY)
    }

    /// True iff an access token is present. There is no local expiry
    /// check, and a store read failure reads as unauthenticated.
    pub fn is_authenticated(&self) -> bool {
        match self.store.get(ACCESS_TOKEN_KEY) {
            Ok(token) => token.is_some(),
            Err(err) => {
                warn!("[Tokens] store read failed: {}", err);
                false
            }
        }
    }

    /// Remove the token pair only.
    pub fn clear_tokens(&self) -> Result<()> {
        self.store.delete(ACCESS_TOKEN_KEY)?;
        self.store.delete(REFRESH_TOKEN_KEY)
    }

    /// Remove every client key, including the cached user profile, goal
    /// snapshot, and pending-change queue.
    pub fn delete_all(&self) -> Result<()> {
        self.store.delete_all(ALL_KEYS)
    }

    pub fn set_biometric_enabled(&self, enabled: bool) -> Result<()> {
        self.store
            .set(BIOMETRIC_ENABLED_KEY, if enabled { "true" } else { "false" })
    }

    pub fn biometric_enabled(&self) -> bool {
        matches!(self.store.get(BIOMETRIC_ENABLED_KEY), Ok(Some(v)) if v == "true")
    }
}
