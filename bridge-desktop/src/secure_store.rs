//! Secure Credential Storage using OS Keychain

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecureStore,
};
use keyring::Entry;
use std::collections::BTreeSet;
use tracing::{debug, error, warn};

const DEFAULT_SERVICE_NAME: &str = "mavrixfy";

/// Keyring entry that records which keys this store has written.
///
/// The OS keychains cannot enumerate entries, so `list_keys` and `clear_all`
/// rely on this index.
const KEY_INDEX_ENTRY: &str = "__key_index";

/// Keyring-based secure storage implementation
///
/// Uses platform-specific secure storage:
/// - macOS: Keychain
/// - Windows: Credential Manager (DPAPI)
/// - Linux: Secret Service (libsecret)
pub struct KeyringSecureStore {
    service_name: String,
}

impl KeyringSecureStore {
    /// Create a new secure store with default service name
    pub fn new() -> Self {
        Self::with_service_name(DEFAULT_SERVICE_NAME)
    }

    /// Create a new secure store with custom service name
    pub fn with_service_name(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service_name, key).map_err(Self::map_keyring_error)
    }

    fn map_keyring_error(e: keyring::Error) -> BridgeError {
        BridgeError::OperationFailed(format!("Keyring error: {}", e))
    }

    fn read_index(&self) -> Result<BTreeSet<String>> {
        match self.entry(KEY_INDEX_ENTRY)?.get_password() {
            Ok(raw) => Ok(parse_index(&raw)),
            Err(keyring::Error::NoEntry) => Ok(BTreeSet::new()),
            Err(e) => Err(Self::map_keyring_error(e)),
        }
    }

    fn write_index(&self, index: &BTreeSet<String>) -> Result<()> {
        let entry = self.entry(KEY_INDEX_ENTRY)?;
        if index.is_empty() {
            return match entry.delete_credential() {
                Ok(_) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(Self::map_keyring_error(e)),
            };
        }
        entry
            .set_password(&format_index(index))
            .map_err(Self::map_keyring_error)
    }

    fn update_index(&self, key: &str, present: bool) {
        let result = self.read_index().and_then(|mut index| {
            let changed = if present {
                index.insert(key.to_string())
            } else {
                index.remove(key)
            };
            if changed {
                self.write_index(&index)
            } else {
                Ok(())
            }
        });

        if let Err(e) = result {
            warn!(key = key, error = %e, "Failed to update keyring key index");
        }
    }
}

impl Default for KeyringSecureStore {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_index(raw: &str) -> BTreeSet<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn format_index(index: &BTreeSet<String>) -> String {
    index.iter().cloned().collect::<Vec<_>>().join("\n")
}

#[async_trait]
impl SecureStore for KeyringSecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        // Keyring only supports strings, so binary data is base64 encoded
        let encoded = STANDARD.encode(value);

        self.entry(key)?
            .set_password(&encoded)
            .map_err(Self::map_keyring_error)?;
        self.update_index(key, true);

        debug!(key = key, "Stored secret in keyring");
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.entry(key)?.get_password() {
            Ok(encoded) => {
                let decoded = STANDARD.decode(&encoded).map_err(|e| {
                    error!(key = key, error = %e, "Failed to decode secret");
                    BridgeError::OperationFailed(format!("Failed to decode secret: {}", e))
                })?;
                Ok(Some(decoded))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Self::map_keyring_error(e)),
        }
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(_) | Err(keyring::Error::NoEntry) => {
                self.update_index(key, false);
                debug!(key = key, "Deleted secret from keyring");
                Ok(())
            }
            Err(e) => Err(Self::map_keyring_error(e)),
        }
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.read_index()?.into_iter().collect())
    }

    async fn clear_all(&self) -> Result<()> {
        for key in self.read_index()? {
            match self.entry(&key)?.delete_credential() {
                Ok(_) | Err(keyring::Error::NoEntry) => {}
                Err(e) => return Err(Self::map_keyring_error(e)),
            }
        }
        self.write_index(&BTreeSet::new())?;

        debug!(service = %self.service_name, "Cleared all secrets");
        Ok(())
    }
}
