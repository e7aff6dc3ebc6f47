//! OS keychain backend.
//!
//! Uses the `keyring` crate to provide a cross-platform interface to:
//! - macOS / iOS: Keychain Services
//! - Linux: Secret Service (GNOME Keyring / KWallet)
//! - Windows: Credential Manager
//!
//! The keychain cannot enumerate the items of a service, so every namespace
//! also carries a small index entry listing the keys written through this
//! store. The index lives under its own service name, outside the item keys
//! callers can write. [`KeyringStore::delete`] walks that index.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use super::{SecretStore, StoreError, StoreResult};

const INDEX_SUFFIX: &str = "/.index";
const INDEX_USER: &str = "keys";

/// Keychain service name holding the JSON list of keys stored under `service`.
pub fn index_service(service: &str) -> String {
    format!("{service}{INDEX_SUFFIX}")
}

impl From<keyring::Error> for StoreError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::NoEntry => StoreError::NotFound,
            keyring::Error::NoStorageAccess(e) => StoreError::AccessDenied(e.to_string()),
            keyring::Error::PlatformFailure(e) => StoreError::Unavailable(e.to_string()),
            other => StoreError::Platform(other.to_string()),
        }
    }
}

/// Store a password in the OS keychain.
pub fn set_password(service: &str, user: &str, secret: &str) -> StoreResult<()> {
    let entry = keyring::Entry::new(service, user)?;
    entry.set_password(secret)?;
    Ok(())
}

/// Retrieve a password from the OS keychain.
pub fn get_password(service: &str, user: &str) -> StoreResult<String> {
    let entry = keyring::Entry::new(service, user)?;
    let password = entry.get_password()?;
    Ok(password)
}

/// Delete a password from the OS keychain.
pub fn delete_password(service: &str, user: &str) -> StoreResult<()> {
    let entry = keyring::Entry::new(service, user)?;
    entry.delete_credential()?;
    Ok(())
}

fn load_index(service: &str) -> StoreResult<Vec<String>> {
    match get_password(&index_service(service), INDEX_USER) {
        Ok(json) => Ok(serde_json::from_str(&json)?),
        Err(StoreError::NotFound) => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

fn save_index(service: &str, keys: &[String]) -> StoreResult<()> {
    set_password(&index_service(service), INDEX_USER, &serde_json::to_string(keys)?)
}

fn write_sync(service: &str, key: &str, secret: &str) -> StoreResult<()> {
    set_password(service, key, secret)?;

    let mut keys = load_index(service)?;
    if !keys.iter().any(|k| k == key) {
        keys.push(key.to_string());
        save_index(service, &keys)?;
    }
    Ok(())
}

fn delete_sync(service: &str) -> StoreResult<()> {
    let keys = load_index(service)?;
    for key in &keys {
        match delete_password(service, key) {
            Ok(()) | Err(StoreError::NotFound) => {}
            Err(e) => return Err(e),
        }
    }
    match delete_password(&index_service(service), INDEX_USER) {
        Ok(()) | Err(StoreError::NotFound) => {}
        Err(e) => return Err(e),
    }
    log::debug!("Removed {} keychain items for service '{}'", keys.len(), service);
    Ok(())
}

/// Run a blocking keychain call on the blocking pool.
pub(super) async fn run_blocking<T, F>(f: F) -> StoreResult<T>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Platform(format!("keychain task failed: {e}")))?
}

/// [`SecretStore`] backed by the OS keychain.
#[derive(Debug, Clone, Default)]
pub struct KeyringStore {
    // Held across each index load-modify-save; clones share it.
    index_lock: Arc<Mutex<()>>,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for KeyringStore {
    fn read(&self, service: &str, key: &str) -> impl Future<Output = StoreResult<String>> + Send {
        let service = service.to_string();
        let key = key.to_string();
        run_blocking(move || get_password(&service, &key))
    }

    fn write(
        &self,
        service: &str,
        key: &str,
        secret: &str,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        let service = service.to_string();
        let key = key.to_string();
        let secret = secret.to_string();
        let index_lock = Arc::clone(&self.index_lock);
        run_blocking(move || {
            let _guard = index_lock.lock().unwrap_or_else(PoisonError::into_inner);
            write_sync(&service, &key, &secret)
        })
    }

    fn delete(&self, service: &str) -> impl Future<Output = StoreResult<()>> + Send {
        let service = service.to_string();
        let index_lock = Arc::clone(&self.index_lock);
        run_blocking(move || {
            let _guard = index_lock.lock().unwrap_or_else(PoisonError::into_inner);
            delete_sync(&service)
        })
    }
}
