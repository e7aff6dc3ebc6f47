//! In-memory secret store.
//!
//! Nothing survives the process. Useful for tests and for hosts that only
//! need the bridge contract without touching the OS keychain.

use std::collections::HashMap;
use std::future::Future;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{SecretStore, StoreError, StoreResult};

/// Map-backed [`SecretStore`] with a switch that simulates an unreachable store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, HashMap<String, String>>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When `false`, every call fails with [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::Relaxed);
    }

    /// Number of secrets stored under `service`.
    pub fn len(&self, service: &str) -> usize {
        self.entries
            .read()
            .map(|e| e.get(service).map_or(0, HashMap::len))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, service: &str) -> bool {
        self.len(service) == 0
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("memory store disabled".to_string()));
        }
        Ok(())
    }

    fn poisoned() -> StoreError {
        StoreError::Platform("memory store lock poisoned".to_string())
    }

    fn read_sync(&self, service: &str, key: &str) -> StoreResult<String> {
        self.check()?;
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        entries
            .get(service)
            .and_then(|items| items.get(key))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn write_sync(&self, service: &str, key: &str, secret: &str) -> StoreResult<()> {
        self.check()?;
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries
            .entry(service.to_string())
            .or_default()
            .insert(key.to_string(), secret.to_string());
        Ok(())
    }

    fn delete_sync(&self, service: &str) -> StoreResult<()> {
        self.check()?;
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.remove(service);
        Ok(())
    }
}

impl SecretStore for MemoryStore {
    fn read(&self, service: &str, key: &str) -> impl Future<Output = StoreResult<String>> + Send {
        let result = self.read_sync(service, key);
        async move { result }
    }

    fn write(
        &self,
        service: &str,
        key: &str,
        secret: &str,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        let result = self.write_sync(service, key, secret);
        async move { result }
    }

    fn delete(&self, service: &str) -> impl Future<Output = StoreResult<()>> + Send {
        let result = self.delete_sync(service);
        async move { result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let store = MemoryStore::new();
        store.write("svc-a", "user", "one").await.unwrap();
        store.write("svc-b", "user", "two").await.unwrap();

        store.delete("svc-a").await.unwrap();

        assert!(store.read("svc-a", "user").await.unwrap_err().is_not_found());
        assert_eq!(store.read("svc-b", "user").await.unwrap(), "two");
        assert!(store.is_empty("svc-a"));
        assert_eq!(store.len("svc-b"), 1);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.write("svc", "user", "secret").await.unwrap();
        store.set_available(false);

        assert!(matches!(
            store.read("svc", "user").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.write("svc", "user", "x").await.is_err());
        assert!(store.delete("svc").await.is_err());

        store.set_available(true);
        assert_eq!(store.read("svc", "user").await.unwrap(), "secret");
    }
}
