//! Bearer credential held for the paired desktop.

use std::fmt;
use std::sync::{Arc, RwLock};

use log::{debug, warn};
use padlink_core::secrets::SecretStore;

/// Storage key of the persisted bearer token.
pub const AUTH_TOKEN_KEY: &str = "auth_token";

/// Current bearer credential, shared by every component issuing requests.
///
/// The token is read on every request attempt, so clearing it takes effect on
/// the very next attempt made by any holder of this session.
pub struct AuthSession {
    token: RwLock<Option<String>>,
    store: Option<Arc<dyn SecretStore>>,
}

impl AuthSession {
    /// Session that forgets its token when the process exits.
    pub fn in_memory() -> Self {
        Self {
            token: RwLock::new(None),
            store: None,
        }
    }

    /// Session backed by a secret store; a previously persisted token is loaded.
    pub fn with_store(store: Arc<dyn SecretStore>) -> Self {
        let token = match store.get_secret(AUTH_TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.trim().is_empty()),
            Err(e) => {
                warn!("[Session] Failed to read persisted token: {}", e);
                None
            }
        };
        debug!("[Session] Loaded session (has_token={})", token.is_some());
        Self {
            token: RwLock::new(token),
            store: Some(store),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn has_token(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    /// Replace the held token and persist it.
    pub fn set_token(&self, token: impl Into<String>) {
        let token = token.into();
        if let Some(store) = &self.store {
            if let Err(e) = store.set_secret(AUTH_TOKEN_KEY, &token) {
                warn!("[Session] Failed to persist token: {}", e);
            }
        }
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token);
    }

    /// Drop the held token. Returns true when a token was present.
    pub fn clear(&self) -> bool {
        let previous = self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(store) = &self.store {
            if let Err(e) = store.delete_secret(AUTH_TOKEN_KEY) {
                warn!("[Session] Failed to delete persisted token: {}", e);
            }
        }
        previous.is_some()
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("has_token", &self.has_token())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}
