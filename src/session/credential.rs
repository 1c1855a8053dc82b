//! Local key/value storage for credentials.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::errors::AppError;

/// Small string key/value store kept on the local device.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError>;

    /// Remove one key. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), AppError>;

    /// Remove every stored key.
    async fn clear(&self) -> Result<(), AppError>;
}

/// Credentials held in memory only; lost when the process exits.
#[derive(Default)]
pub struct MemoryCredentialStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        self.values.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), AppError> {
        self.values.write().await.clear();
        Ok(())
    }
}

/// Account name of the single keyring entry holding every stored key.
const KEYRING_ACCOUNT: &str = "credentials";

/// Credentials kept in the operating system's secure store (Keychain,
/// Credential Manager, kernel keyring), encrypted at rest by the OS.
///
/// All keys live as one JSON object in a single entry, so `clear` is a
/// single delete.
pub struct KeyringCredentialStore {
    entry: Arc<keyring::Entry>,
    lock: Mutex<()>,
}

impl KeyringCredentialStore {
    pub fn new(service: &str) -> Result<Self, AppError> {
        let entry = keyring::Entry::new(service, KEYRING_ACCOUNT).map_err(keyring_error)?;
        Ok(Self {
            entry: Arc::new(entry),
            lock: Mutex::new(()),
        })
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>, AppError> {
        let entry = self.entry.clone();
        match blocking(move || entry.get_password()).await? {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                AppError::Internal(format!("Corrupt credential entry: {}", e))
            }),
            Err(keyring::Error::NoEntry) => Ok(BTreeMap::new()),
            Err(e) => Err(keyring_error(e)),
        }
    }

    async fn write_all(&self, values: &BTreeMap<String, String>) -> Result<(), AppError> {
        let raw = serde_json::to_string(values)?;
        let entry = self.entry.clone();
        blocking(move || entry.set_password(&raw))
            .await?
            .map_err(keyring_error)
    }

    async fn delete_all(&self) -> Result<(), AppError> {
        let entry = self.entry.clone();
        match blocking(move || entry.delete_credential()).await? {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(keyring_error(e)),
        }
    }
}

/// Platform keyring calls block, so they run off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("Keyring task failed: {}", e)))
}

fn keyring_error(err: keyring::Error) -> AppError {
    tracing::warn!("Keyring error: {}", err);
    AppError::Internal(format!("Keyring error: {}", err))
}

#[async_trait]
impl CredentialStore for KeyringCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let _guard = self.lock.lock().await;
        let mut values = self.read_all().await?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values).await
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        let _guard = self.lock.lock().await;
        let mut values = self.read_all().await?;
        if values.remove(key).is_none() {
            return Ok(());
        }
        if values.is_empty() {
            self.delete_all().await
        } else {
            self.write_all(&values).await
        }
    }

    async fn clear(&self) -> Result<(), AppError> {
        let _guard = self.lock.lock().await;
        self.delete_all().await
    }
}
