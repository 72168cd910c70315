//! Secure key-value storage abstraction.
//!
//! The platform shells own the actual secure primitive (keychain on iOS,
//! keyring on desktop, encrypted storage on Android). Core code only
//! sees the `SecretStore` contract: string keys, persisted across
//! process restarts.

use std::collections::HashMap;
use std::sync::Mutex;

use keyring::Entry;

use crate::errors::{Error, Result};

const USERNAME: &str = "default";

/// Opaque persistent key-value store for tokens and cached client state.
pub trait SecretStore: Send + Sync {
    /// Retrieve a value, `None` when the key has never been set.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, overwriting any previous one.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a key. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// Remove every listed key.
    fn delete_all(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.delete(key)?;
        }
        Ok(())
    }
}

/// `SecretStore` backed by the operating system keyring.
#[derive(Debug)]
pub struct KeyringSecretStore {
    service: String,
}

impl KeyringSecretStore {
    /// `service` namespaces this application's entries in the keyring.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry_for(&self, key: &str) -> Result<Entry> {
        let service_id = format!("{}.{}", self.service, key);
        Entry::new(&service_id, USERNAME).map_err(|err| Error::Secret(err.to_string()))
    }
}

impl SecretStore for KeyringSecretStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entry = self.entry_for(key)?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(Error::Secret(err.to_string())),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let entry = self.entry_for(key)?;
        entry
            .set_password(value)
            .map_err(|err| Error::Secret(err.to_string()))
    }

    fn delete(&self, key: &str) -> Result<()> {
        let entry = self.entry_for(key)?;
        match entry.delete_password() {
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(Error::Secret(err.to_string())),
        }
    }
}

/// In-process store for tests and demo runs. Not persisted.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
        Ok(())
    }
}
