//! Platform secret stores.
//!
//! Every backend exposes the same three primitives, addressed by a service
//! namespace and an item key:
//! - **keyring**: OS keychain (macOS Keychain, Secret Service, Credential Manager)
//! - **file**: AES-256-GCM encrypted file, used where no keychain is reachable
//! - **memory**: in-process map for tests and embedding

pub mod file;
pub mod keyring;
pub mod memory;

pub use file::EncryptedFileStore;
pub use keyring::KeyringStore;
pub use memory::MemoryStore;

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors reported by a secret store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no credential found")]
    NotFound,
    #[error("access to the secret store was denied: {0}")]
    AccessDenied(String),
    #[error("secret store unavailable: {0}")]
    Unavailable(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("crypto error: {0}")]
    Crypto(String),
    #[error("malformed store data: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("platform error: {0}")]
    Platform(String),
}

impl StoreError {
    /// `true` when the error only means "nothing stored under this key".
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// SecretStore trait
// ---------------------------------------------------------------------------

/// Capability interface over a platform secret store.
///
/// Implementations must not block the calling task: anything that waits on
/// the OS belongs on the blocking pool.
pub trait SecretStore: Send + Sync {
    /// Read the secret stored under `(service, key)`.
    ///
    /// Returns [`StoreError::NotFound`] when nothing is stored.
    fn read(&self, service: &str, key: &str) -> impl Future<Output = StoreResult<String>> + Send;

    /// Store `secret` under `(service, key)`, replacing any previous value.
    fn write(
        &self,
        service: &str,
        key: &str,
        secret: &str,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Delete every secret stored under `service`.
    ///
    /// Deleting an empty namespace succeeds.
    fn delete(&self, service: &str) -> impl Future<Output = StoreResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Dyn-compatible wrapper for SecretStore
// ---------------------------------------------------------------------------

/// Boxed future alias used by [`SecretStoreDyn`].
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Object-safe version of [`SecretStore`], using boxed futures.
///
/// Auto-implemented for every `T: SecretStore + 'static`.
/// Use `Box<dyn SecretStoreDyn>` when the backend is picked at runtime.
pub trait SecretStoreDyn: Send + Sync {
    fn read_dyn<'a>(&'a self, service: &'a str, key: &'a str) -> StoreFuture<'a, String>;

    fn write_dyn<'a>(
        &'a self,
        service: &'a str,
        key: &'a str,
        secret: &'a str,
    ) -> StoreFuture<'a, ()>;

    fn delete_dyn<'a>(&'a self, service: &'a str) -> StoreFuture<'a, ()>;
}

impl<T: SecretStore + 'static> SecretStoreDyn for T {
    fn read_dyn<'a>(&'a self, service: &'a str, key: &'a str) -> StoreFuture<'a, String> {
        Box::pin(self.read(service, key))
    }

    fn write_dyn<'a>(
        &'a self,
        service: &'a str,
        key: &'a str,
        secret: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(self.write(service, key, secret))
    }

    fn delete_dyn<'a>(&'a self, service: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(self.delete(service))
    }
}

impl SecretStore for Box<dyn SecretStoreDyn> {
    fn read(&self, service: &str, key: &str) -> impl Future<Output = StoreResult<String>> + Send {
        async move { (**self).read_dyn(service, key).await }
    }

    fn write(
        &self,
        service: &str,
        key: &str,
        secret: &str,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        async move { (**self).write_dyn(service, key, secret).await }
    }

    fn delete(&self, service: &str) -> impl Future<Output = StoreResult<()>> + Send {
        async move { (**self).delete_dyn(service).await }
    }
}
