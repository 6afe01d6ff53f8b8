//! Password storage
//!
//! The keyring implementation keeps every password in a SINGLE keychain
//! entry holding a JSON map, so macOS asks for keychain access once rather
//! than once per connection.

use dbcx_core::{DbcxError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Service name used for the keychain entry
const SERVICE_NAME: &str = "dev.dbcx.connections";

/// Account name for the single keychain entry that stores all credentials
const ACCOUNT_NAME: &str = "credentials";

/// Key under which a connection's password is stored
pub fn password_key(connection_id: Uuid) -> String {
    format!("password.{}", connection_id)
}

/// Durable store for connection passwords
pub trait SecretStore: Send + Sync {
    fn store_password(&self, connection_id: Uuid, password: &str) -> Result<()>;
    fn get_password(&self, connection_id: Uuid) -> Result<Option<String>>;
    /// Deleting a missing password is not an error
    fn delete_password(&self, connection_id: Uuid) -> Result<()>;
}

/// Secrets in the OS keychain (macOS Keychain, Windows Credential Manager,
/// Secret Service on Linux)
pub struct KeyringSecretStore {
    /// Loaded lazily on first access to avoid an early permission prompt
    cache: RwLock<Option<HashMap<String, String>>>,
}

impl KeyringSecretStore {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(None),
        }
    }

    fn entry() -> Result<keyring::Entry> {
        keyring::Entry::new(SERVICE_NAME, ACCOUNT_NAME)
            .map_err(|e| DbcxError::Security(format!("Failed to create keyring entry: {}", e)))
    }

    fn load() -> Result<HashMap<String, String>> {
        match Self::entry()?.get_password() {
            Ok(json) => Ok(serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "unreadable credentials entry, starting fresh");
                HashMap::new()
            })),
            Err(keyring::Error::NoEntry) => {
                tracing::debug!("no credentials found in keychain");
                Ok(HashMap::new())
            }
            Err(e) => Err(DbcxError::Security(format!("Failed to access keychain: {}", e))),
        }
    }

    fn save(credentials: &HashMap<String, String>) -> Result<()> {
        let entry = Self::entry()?;
        if credentials.is_empty() {
            return match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(DbcxError::Security(format!("Failed to clear keychain entry: {}", e))),
            };
        }
        let json = serde_json::to_string(credentials)?;
        entry
            .set_password(&json)
            .map_err(|e| DbcxError::Security(format!("Failed to store credentials in keychain: {}", e)))
    }

    /// Run `f` on the loaded credential map
    fn with_credentials<R>(&self, f: impl FnOnce(&mut HashMap<String, String>) -> Result<R>) -> Result<R> {
        let mut cache = self.cache.write();
        if cache.is_none() {
            *cache = Some(Self::load()?);
        }
        f(cache.get_or_insert_with(HashMap::new))
    }
}

impl Default for KeyringSecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for KeyringSecretStore {
    fn store_password(&self, connection_id: Uuid, password: &str) -> Result<()> {
        self.with_credentials(|credentials| {
            credentials.insert(password_key(connection_id), password.to_string());
            Self::save(credentials)
        })?;
        tracing::debug!(connection_id = %connection_id, "stored password");
        Ok(())
    }

    fn get_password(&self, connection_id: Uuid) -> Result<Option<String>> {
        self.with_credentials(|credentials| Ok(credentials.get(&password_key(connection_id)).cloned()))
    }

    fn delete_password(&self, connection_id: Uuid) -> Result<()> {
        self.with_credentials(|credentials| {
            if credentials.remove(&password_key(connection_id)).is_some() {
                Self::save(credentials)?;
                tracing::debug!(connection_id = %connection_id, "deleted password");
            }
            Ok(())
        })
    }
}

/// Process-local secrets, used in tests and when no keychain is available
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn store_password(&self, connection_id: Uuid, password: &str) -> Result<()> {
        self.secrets
            .write()
            .insert(password_key(connection_id), password.to_string());
        Ok(())
    }

    fn get_password(&self, connection_id: Uuid) -> Result<Option<String>> {
        Ok(self.secrets.read().get(&password_key(connection_id)).cloned())
    }

    fn delete_password(&self, connection_id: Uuid) -> Result<()> {
        self.secrets.write().remove(&password_key(connection_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_key_format() {
        let id = Uuid::parse_str("12345678-1234-1234-1234-123456789abc").unwrap();
        assert_eq!(password_key(id), "password.12345678-1234-1234-1234-123456789abc");
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemorySecretStore::new();
        let id = Uuid::new_v4();
        assert_eq!(store.get_password(id).unwrap(), None);

        store.store_password(id, "hunter2").unwrap();
        assert_eq!(store.get_password(id).unwrap().as_deref(), Some("hunter2"));

        store.delete_password(id).unwrap();
        store.delete_password(id).unwrap();
        assert_eq!(store.get_password(id).unwrap(), None);
    }
}
