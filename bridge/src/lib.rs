//! Keychain Bridge - native secure credential storage for app runtimes
//!
//! Exposes a small set of remote-callable operations to a host runtime:
//! - `getGenericPasswordForOptions` / `setGenericPasswordForOptions`
//! - `resetGenericPasswordForOptions` / `hasGenericPasswordForOptions`
//! - `setUsername`
//!
//! Each operation makes one call into a platform secret store (OS keychain,
//! encrypted file, or memory) and settles a resolve/reject promise.

pub mod bridge;
pub mod config;
pub mod store;

// Re-export commonly used types
pub use bridge::{
    AuthenticationListener, CredentialBridge, Dispatcher, Options, Promise, Settlement,
};
pub use config::{Backend, BridgeConfig};
pub use store::{SecretStore, SecretStoreDyn, StoreError};
