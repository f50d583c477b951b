//! Storage seam for small persistent secrets (bearer token, device identity).

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

/// Errors raised by a secret store backend.
#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error("secret store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("secret store is corrupted: {0}")]
    Corrupted(String),

    #[error("secret store lock poisoned")]
    Poisoned,

    /// Platform keychain refused or failed the operation.
    #[error("secret store backend error: {0}")]
    Backend(String),
}

/// Key/value store for string secrets that must survive restarts.
pub trait SecretStore: Send + Sync {
    fn get_secret(&self, key: &str) -> Result<Option<String>, SecretStoreError>;
    fn set_secret(&self, key: &str, value: &str) -> Result<(), SecretStoreError>;
    fn delete_secret(&self, key: &str) -> Result<(), SecretStoreError>;
}

/// Process-local store. Used by tests and by hosts without durable storage.
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    values: RwLock<HashMap<String, String>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for InMemorySecretStore {
    fn get_secret(&self, key: &str) -> Result<Option<String>, SecretStoreError> {
        let values = self.values.read().map_err(|_| SecretStoreError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set_secret(&self, key: &str, value: &str) -> Result<(), SecretStoreError> {
        let mut values = self.values.write().map_err(|_| SecretStoreError::Poisoned)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete_secret(&self, key: &str) -> Result<(), SecretStoreError> {
        let mut values = self.values.write().map_err(|_| SecretStoreError::Poisoned)?;
        values.remove(key);
        Ok(())
    }
}
