//! Bridge configuration.
//!
//! Defaults, overridden by an optional JSON file, overridden by environment
//! variables. The resulting [`BridgeConfig`] picks the service namespace and
//! the secret store backend.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{
    self, EncryptedFileStore, KeyringStore, MemoryStore, SecretStoreDyn, StoreError,
};

pub const DEFAULT_SERVICE: &str = "org.keychain-bridge.keychain";

pub const ENV_SERVICE: &str = "KEYCHAIN_BRIDGE_SERVICE";
pub const ENV_BACKEND: &str = "KEYCHAIN_BRIDGE_BACKEND";
pub const ENV_STORE_PATH: &str = "KEYCHAIN_BRIDGE_STORE_PATH";
pub const ENV_PASSPHRASE: &str = "KEYCHAIN_BRIDGE_PASSPHRASE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unknown backend '{0}', expected keyring, file or memory")]
    UnknownBackend(String),
    #[error("service namespace must not be empty")]
    EmptyService,
    #[error("failed to open secret store: {0}")]
    Store(#[from] StoreError),
}

/// Which secret store the bridge talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Keyring,
    File,
    Memory,
}

impl Backend {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keyring" | "keychain" => Ok(Backend::Keyring),
            "file" => Ok(Backend::File),
            "memory" => Ok(Backend::Memory),
            _ => Err(ConfigError::UnknownBackend(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Namespace all credentials are grouped under.
    pub service: String,
    pub backend: Backend,
    /// Location of the encrypted file for [`Backend::File`].
    pub store_path: Option<PathBuf>,
    /// Derive the file key from this passphrase instead of the keychain.
    #[serde(skip_serializing)]
    pub passphrase: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            service: DEFAULT_SERVICE.to_string(),
            backend: Backend::default(),
            store_path: None,
            passphrase: None,
        }
    }
}

impl BridgeConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: BridgeConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides looked up through `var`.
    pub fn with_overrides<F>(mut self, var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(service) = var(ENV_SERVICE) {
            self.service = service;
        }
        if let Some(backend) = var(ENV_BACKEND) {
            self.backend = Backend::parse(&backend)?;
        }
        if let Some(path) = var(ENV_STORE_PATH) {
            self.store_path = Some(PathBuf::from(path));
        }
        if let Some(passphrase) = var(ENV_PASSPHRASE) {
            self.passphrase = Some(passphrase);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.trim().is_empty() {
            return Err(ConfigError::EmptyService);
        }
        Ok(())
    }

    /// Path of the encrypted file store.
    pub fn resolved_store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(store::file::default_path)
    }

    /// Build the configured secret store.
    ///
    /// Keychain lookups for the file key run on the blocking pool.
    pub async fn open_store(&self) -> Result<Box<dyn SecretStoreDyn>, ConfigError> {
        let store: Box<dyn SecretStoreDyn> = match self.backend {
            Backend::Keyring => Box::new(KeyringStore::new()),
            Backend::Memory => Box::new(MemoryStore::new()),
            Backend::File => {
                let path = self.resolved_store_path();
                match &self.passphrase {
                    Some(passphrase) => {
                        Box::new(EncryptedFileStore::with_passphrase(path, passphrase))
                    }
                    None => Box::new(EncryptedFileStore::with_keychain_key(path).await?),
                }
            }
        };
        log::info!(
            "Using {:?} secret store for service '{}'",
            self.backend,
            self.service
        );
        Ok(store)
    }
}
