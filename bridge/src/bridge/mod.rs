//! The credential bridge.
//!
//! Translates the remote-callable keychain operations into calls against a
//! [`SecretStore`] and settles the caller's [`Promise`]:
//! - **getGenericPasswordForOptions**: read failures resolve `false`
//! - **setGenericPasswordForOptions**: write failures reject
//! - **resetGenericPasswordForOptions**: delete failures reject
//! - **setUsername**: memory only, always resolves
//!
//! The read/write asymmetry is part of the remote contract.

pub mod dispatch;
pub mod listener;
pub mod options;
pub mod promise;

pub use dispatch::{Call, DispatchError, Dispatcher, Reply};
pub use listener::{AuthenticationListener, PromptGuard};
pub use options::{AuthenticationPrompt, Options, SecurityLevel};
pub use promise::{Promise, Settlement};

use std::sync::{Mutex, PoisonError};

use serde_json::{Value, json};

use crate::store::{SecretStore, StoreResult};

/// Bridges one service namespace of a [`SecretStore`] to the runtime.
///
/// Tracks a single account identifier, used as the item key for reads.
pub struct CredentialBridge<S> {
    store: S,
    service: String,
    account: Mutex<String>,
    listener: Option<AuthenticationListener>,
}

impl<S> std::fmt::Debug for CredentialBridge<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialBridge")
            .field("service", &self.service)
            .field("account", &self.account())
            .finish_non_exhaustive()
    }
}

impl<S> CredentialBridge<S> {
    pub fn new(store: S, service: impl Into<String>) -> Self {
        Self {
            store,
            service: service.into(),
            account: Mutex::new(String::new()),
            listener: None,
        }
    }

    /// Signal OS authentication prompts through `listener`.
    pub fn with_listener(mut self, listener: AuthenticationListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn listener(&self) -> Option<&AuthenticationListener> {
        self.listener.as_ref()
    }

    /// The tracked account identifier; empty when none is set.
    pub fn account(&self) -> String {
        self.account
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_account(&self, account: &str) {
        let mut current = self.account.lock().unwrap_or_else(PoisonError::into_inner);
        current.clear();
        current.push_str(account);
    }

    fn prompt_guard(&self, options: &Options) -> Option<PromptGuard> {
        match &self.listener {
            Some(listener) if options.requires_authentication() => Some(listener.prompt()),
            _ => None,
        }
    }
}

impl<S: SecretStore> CredentialBridge<S> {
    // -----------------------------------------------------------------------
    // Direct operations
    // -----------------------------------------------------------------------

    /// Read the secret of the tracked account.
    ///
    /// Every store error, including "not found", yields `None`.
    pub async fn get_credential(&self, options: &Options) -> Option<String> {
        let account = self.account();
        let _prompt = self.prompt_guard(options);
        match self.store.read(&self.service, &account).await {
            Ok(secret) => {
                tracing::debug!(service = %self.service, "credential read");
                Some(secret)
            }
            Err(e) => {
                tracing::warn!(service = %self.service, error = %e, "credential read failed");
                None
            }
        }
    }

    /// Whether a secret exists for the tracked account.
    pub async fn has_credential(&self, options: &Options) -> bool {
        self.get_credential(options).await.is_some()
    }

    /// Track `account` and store `secret` under it.
    ///
    /// `min_security_level` is accepted for compatibility and not enforced.
    pub async fn set_credential(
        &self,
        options: &Options,
        account: &str,
        secret: &str,
        min_security_level: Option<&str>,
    ) -> StoreResult<()> {
        if let Some(level) = min_security_level
            && !level.is_empty()
            && SecurityLevel::parse(level).is_none()
        {
            tracing::debug!(level = %level, "ignoring unrecognized security level");
        }

        self.replace_account(account);

        let _prompt = self.prompt_guard(options);
        self.store
            .write(&self.service, account, secret)
            .await
            .inspect(|_| tracing::debug!(service = %self.service, "credential stored"))
            .inspect_err(|e| {
                tracing::warn!(service = %self.service, error = %e, "credential write failed");
            })
    }

    /// Forget the tracked account and delete every secret in the namespace.
    pub async fn reset_credential(&self, options: &Options) -> StoreResult<()> {
        self.replace_account("");

        let _prompt = self.prompt_guard(options);
        self.store
            .delete(&self.service)
            .await
            .inspect(|_| tracing::debug!(service = %self.service, "credentials reset"))
            .inspect_err(|e| {
                tracing::warn!(service = %self.service, error = %e, "credential reset failed");
            })
    }

    /// Track `account` without touching the store.
    pub fn set_account_identifier(&self, account: &str) {
        tracing::debug!(account = %account, "account identifier set");
        self.replace_account(account);
    }

    // -----------------------------------------------------------------------
    // Promise-settling operations (remote surface)
    // -----------------------------------------------------------------------

    /// Resolves `[{"password": ...}]`, or `[false]` when nothing can be read.
    pub async fn get_generic_password_for_options(&self, options: &Options, promise: Promise) {
        tracing::debug!("invoked getGenericPasswordForOptions");
        match self.get_credential(options).await {
            Some(password) => promise.resolve(vec![json!({ "password": password })]),
            None => promise.resolve(vec![Value::Bool(false)]),
        }
    }

    /// Resolves `[true]` or `[false]`; never rejects.
    pub async fn has_generic_password_for_options(&self, options: &Options, promise: Promise) {
        tracing::debug!("invoked hasGenericPasswordForOptions");
        let exists = self.has_credential(options).await;
        promise.resolve(vec![Value::Bool(exists)]);
    }

    /// Resolves `[true]`, rejects `[]` when the store write fails.
    pub async fn set_generic_password_for_options(
        &self,
        options: &Options,
        username: &str,
        password: &str,
        min_security_level: Option<&str>,
        promise: Promise,
    ) {
        tracing::debug!("invoked setGenericPasswordForOptions");
        match self
            .set_credential(options, username, password, min_security_level)
            .await
        {
            Ok(()) => promise.resolve(vec![Value::Bool(true)]),
            Err(_) => promise.reject(Vec::new()),
        }
    }

    /// Resolves `[]`, rejects `[]` when the store delete fails.
    pub async fn reset_generic_password_for_options(&self, options: &Options, promise: Promise) {
        tracing::debug!("invoked resetGenericPasswordForOptions");
        match self.reset_credential(options).await {
            Ok(()) => promise.resolve(Vec::new()),
            Err(_) => promise.reject(Vec::new()),
        }
    }

    /// Always resolves `[true]`.
    pub fn set_username(&self, username: &str, promise: Promise) {
        self.set_account_identifier(username);
        promise.resolve(vec![Value::Bool(true)]);
    }
}
