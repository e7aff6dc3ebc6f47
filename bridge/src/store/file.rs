//! Encrypted local file store.
//!
//! Fallback for targets without a usable keychain. All secrets live in one
//! AES-256-GCM sealed file laid out as `nonce (12 bytes) || ciphertext`.
//! A fresh nonce is drawn for every write.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use super::{SecretStore, StoreError, StoreResult, keyring};

const KEYRING_SERVICE: &str = "keychain-bridge";
const KEYRING_USER: &str = "file-store-key";
const STORE_DIR: &str = "keychain-bridge";
const STORE_FILE: &str = "credentials.enc";
const NONCE_LEN: usize = 12;

/// The data structure sealed in the file: service -> key -> secret.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreData {
    #[serde(default)]
    pub services: HashMap<String, HashMap<String, String>>,
}

/// Generate a cryptographically secure random key.
fn generate_key_seed() -> StoreResult<[u8; 32]> {
    let mut key = [0u8; 32];
    getrandom::fill(&mut key).map_err(|e| StoreError::Crypto(format!("rng failure: {e}")))?;
    Ok(key)
}

/// Generate or retrieve the file encryption key from the keychain.
fn get_or_create_key() -> StoreResult<[u8; 32]> {
    match keyring::get_password(KEYRING_SERVICE, KEYRING_USER) {
        Ok(key_hex) => {
            let mut key = [0u8; 32];
            hex::decode_to_slice(&key_hex, &mut key)
                .map_err(|e| StoreError::Crypto(format!("stored key is malformed: {e}")))?;
            Ok(key)
        }
        Err(StoreError::NotFound) => {
            let key = generate_key_seed()?;
            keyring::set_password(KEYRING_SERVICE, KEYRING_USER, &hex::encode(key))?;
            log::info!("Generated a new file store key");
            Ok(key)
        }
        Err(e) => Err(e),
    }
}

/// Default location of the store file.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(STORE_DIR)
        .join(STORE_FILE)
}

/// [`SecretStore`] sealed into a single encrypted file.
pub struct EncryptedFileStore {
    path: PathBuf,
    key: Zeroizing<[u8; 32]>,
    // Serializes read-modify-write cycles on the file.
    lock: Mutex<()>,
}

impl std::fmt::Debug for EncryptedFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedFileStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl EncryptedFileStore {
    /// Open a store at `path` sealed with a raw 256-bit key.
    pub fn new(path: impl Into<PathBuf>, key: [u8; 32]) -> Self {
        Self {
            path: path.into(),
            key: Zeroizing::new(key),
            lock: Mutex::new(()),
        }
    }

    /// Open a store at `path` whose key is the SHA-256 digest of `passphrase`.
    pub fn with_passphrase(path: impl Into<PathBuf>, passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self::new(path, key)
    }

    /// Open a store at `path` whose key is kept in the OS keychain,
    /// generating one on first use. The keychain lookup runs on the blocking
    /// pool.
    pub async fn with_keychain_key(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let key = keyring::run_blocking(get_or_create_key).await?;
        Ok(Self::new(path, key))
    }

    /// Open the store at [`default_path`] with a keychain-held key.
    pub async fn open_default() -> StoreResult<Self> {
        Self::with_keychain_key(default_path()).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cipher(&self) -> StoreResult<Aes256Gcm> {
        Aes256Gcm::new_from_slice(self.key.as_slice())
            .map_err(|e| StoreError::Crypto(format!("invalid key: {e}")))
    }

    fn seal(&self, data: &[u8]) -> StoreResult<Vec<u8>> {
        let cipher = self.cipher()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        getrandom::fill(&mut nonce_bytes)
            .map_err(|e| StoreError::Crypto(format!("rng failure: {e}")))?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, data)
            .map_err(|e| StoreError::Crypto(format!("encryption failed: {e}")))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open(&self, sealed: &[u8]) -> StoreResult<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(StoreError::Crypto("store file is truncated".to_string()));
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let cipher = self.cipher()?;
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| StoreError::Crypto(format!("decryption failed: {e}")))
    }

    /// Load and decrypt the store. A missing file is an empty store.
    pub async fn load(&self) -> StoreResult<StoreData> {
        let sealed = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StoreData::default()),
            Err(e) => return Err(e.into()),
        };
        let plaintext = Zeroizing::new(self.open(&sealed)?);
        Ok(serde_json::from_slice(&plaintext)?)
    }

    async fn save(&self, data: &StoreData) -> StoreResult<()> {
        let serialized = Zeroizing::new(serde_json::to_vec(data)?);
        let sealed = self.seal(&serialized)?;

        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(dir).await?;
        }

        let tmp = self.path.with_extension("enc.tmp");
        tokio::fs::write(&tmp, &sealed).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Apply `f` to the store contents and write them back.
    pub async fn update<F>(&self, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut StoreData),
    {
        let _guard = self.lock.lock().await;
        let mut data = self.load().await?;
        f(&mut data);
        self.save(&data).await
    }
}

impl SecretStore for EncryptedFileStore {
    fn read(&self, service: &str, key: &str) -> impl Future<Output = StoreResult<String>> + Send {
        async move {
            let _guard = self.lock.lock().await;
            let data = self.load().await?;
            data.services
                .get(service)
                .and_then(|items| items.get(key))
                .cloned()
                .ok_or(StoreError::NotFound)
        }
    }

    fn write(
        &self,
        service: &str,
        key: &str,
        secret: &str,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        async move {
            self.update(|data| {
                data.services
                    .entry(service.to_string())
                    .or_default()
                    .insert(key.to_string(), secret.to_string());
            })
            .await
        }
    }

    fn delete(&self, service: &str) -> impl Future<Output = StoreResult<()>> + Send {
        async move {
            self.update(|data| {
                if let Some(items) = data.services.remove(service) {
                    log::debug!("Removed {} file store items for '{}'", items.len(), service);
                }
            })
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store(dir: &tempfile::TempDir) -> EncryptedFileStore {
        EncryptedFileStore::new(dir.path().join("store.enc"), [7u8; 32])
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir);
        let data = store.load().await.unwrap();
        assert!(data.services.is_empty());
    }

    #[tokio::test]
    async fn identical_writes_use_fresh_nonces() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir);

        store.write("svc", "user", "secret").await.unwrap();
        let first = std::fs::read(store.path()).unwrap();
        store.write("svc", "user", "secret").await.unwrap();
        let second = std::fs::read(store.path()).unwrap();

        assert_ne!(first[..NONCE_LEN], second[..NONCE_LEN]);
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn secret_is_not_stored_in_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir);
        store
            .write("svc", "user", "very-recognizable-secret")
            .await
            .unwrap();

        let raw = std::fs::read(store.path()).unwrap();
        let needle = b"very-recognizable-secret";
        assert!(!raw.windows(needle.len()).any(|w| w == needle));
    }

    #[tokio::test]
    async fn truncated_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir);
        std::fs::write(store.path(), [1u8, 2, 3]).unwrap();
        assert!(matches!(store.load().await, Err(StoreError::Crypto(_))));
    }

    #[test]
    fn passphrase_key_is_deterministic() {
        let a = EncryptedFileStore::with_passphrase("a.enc", "hunter2");
        let b = EncryptedFileStore::with_passphrase("b.enc", "hunter2");
        let c = EncryptedFileStore::with_passphrase("c.enc", "hunter3");
        assert_eq!(*a.key, *b.key);
        assert_ne!(*a.key, *c.key);
    }

    #[tokio::test(flavor = "current_thread")]
    #[ignore] // Requires actual keychain access
    async fn keychain_key_is_stable_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.enc");

        let first = EncryptedFileStore::with_keychain_key(&path).await.unwrap();
        first.write("svc", "user", "secret").await.unwrap();

        let second = EncryptedFileStore::with_keychain_key(&path).await.unwrap();
        assert_eq!(second.read("svc", "user").await.unwrap(), "secret");
    }

    #[test]
    fn debug_output_hides_key() {
        let store = EncryptedFileStore::new("x.enc", [0xAB; 32]);
        let debug = format!("{store:?}");
        assert!(debug.contains("x.enc"));
        assert!(!debug.contains("171"));
    }
}
