//! Remote method dispatch.
//!
//! Routes a method name plus a JSON argument list to the matching bridge
//! operation. Malformed calls reject with `[{"code", "message"}]`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use super::{CredentialBridge, Options, Promise, SecurityLevel, Settlement};
use crate::store::SecretStore;

pub const GET_GENERIC_PASSWORD: &str = "getGenericPasswordForOptions";
pub const SET_GENERIC_PASSWORD: &str = "setGenericPasswordForOptions";
pub const RESET_GENERIC_PASSWORD: &str = "resetGenericPasswordForOptions";
pub const HAS_GENERIC_PASSWORD: &str = "hasGenericPasswordForOptions";
pub const SET_USERNAME: &str = "setUsername";

/// Every method name the dispatcher answers to.
pub const METHODS: [&str; 5] = [
    GET_GENERIC_PASSWORD,
    SET_GENERIC_PASSWORD,
    RESET_GENERIC_PASSWORD,
    HAS_GENERIC_PASSWORD,
    SET_USERNAME,
];

/// Errors raised before a call reaches the bridge.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown method: {0}")]
    UnknownMethod(String),
    #[error("invalid arguments for {method}: {reason}")]
    InvalidArguments { method: String, reason: String },
}

impl DispatchError {
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::UnknownMethod(_) => "E_UNKNOWN_METHOD",
            DispatchError::InvalidArguments { .. } => "E_INVALID_ARGUMENTS",
        }
    }

    fn invalid(method: &str, reason: impl Into<String>) -> Self {
        DispatchError::InvalidArguments {
            method: method.to_string(),
            reason: reason.into(),
        }
    }

    fn to_args(&self) -> Vec<Value> {
        vec![json!({ "code": self.code(), "message": self.to_string() })]
    }
}

/// One line of the host protocol: a remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// One line of the host protocol: the settlement of a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub id: u64,
    pub resolved: bool,
    pub args: Vec<Value>,
}

impl Reply {
    pub fn new(id: u64, settlement: Settlement) -> Self {
        match settlement {
            Settlement::Resolved(args) => Self {
                id,
                resolved: true,
                args,
            },
            Settlement::Rejected(args) => Self {
                id,
                resolved: false,
                args,
            },
        }
    }
}

static NULL: Value = Value::Null;

fn arg(args: &[Value], index: usize) -> &Value {
    args.get(index).unwrap_or(&NULL)
}

fn string_arg<'a>(
    method: &str,
    args: &'a [Value],
    index: usize,
    name: &str,
) -> Result<&'a str, DispatchError> {
    arg(args, index)
        .as_str()
        .ok_or_else(|| DispatchError::invalid(method, format!("`{name}` must be a string")))
}

fn optional_string_arg<'a>(
    method: &str,
    args: &'a [Value],
    index: usize,
    name: &str,
) -> Result<Option<&'a str>, DispatchError> {
    match arg(args, index) {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.as_str())),
        _ => Err(DispatchError::invalid(
            method,
            format!("`{name}` must be a string or null"),
        )),
    }
}

fn options_arg(method: &str, args: &[Value], index: usize) -> Result<Options, DispatchError> {
    Options::from_value(arg(args, index))
        .map_err(|e| DispatchError::invalid(method, format!("bad options: {e}")))
}

/// A decoded remote call.
enum Request<'a> {
    Get(Options),
    Has(Options),
    Set {
        options: Options,
        username: &'a str,
        password: &'a str,
        min_security_level: Option<&'a str>,
    },
    Reset(Options),
    SetUsername(&'a str),
}

impl<'a> Request<'a> {
    fn parse(method: &str, args: &'a [Value]) -> Result<Self, DispatchError> {
        let request = match method {
            GET_GENERIC_PASSWORD => Request::Get(options_arg(method, args, 0)?),
            HAS_GENERIC_PASSWORD => Request::Has(options_arg(method, args, 0)?),
            SET_GENERIC_PASSWORD => Request::Set {
                options: options_arg(method, args, 0)?,
                username: string_arg(method, args, 1, "username")?,
                password: string_arg(method, args, 2, "password")?,
                min_security_level: optional_string_arg(method, args, 3, "minSecLevel")?,
            },
            RESET_GENERIC_PASSWORD => Request::Reset(options_arg(method, args, 0)?),
            SET_USERNAME => Request::SetUsername(string_arg(method, args, 0, "username")?),
            other => return Err(DispatchError::UnknownMethod(other.to_string())),
        };
        Ok(request)
    }
}

/// Routes remote calls to a shared [`CredentialBridge`].
pub struct Dispatcher<S> {
    bridge: Arc<CredentialBridge<S>>,
}

impl<S> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            bridge: Arc::clone(&self.bridge),
        }
    }
}

impl<S: SecretStore> Dispatcher<S> {
    pub fn new(bridge: Arc<CredentialBridge<S>>) -> Self {
        Self { bridge }
    }

    pub fn bridge(&self) -> &CredentialBridge<S> {
        &self.bridge
    }

    /// Constants exported to the runtime at registration time.
    pub fn constants() -> Value {
        let levels = [
            SecurityLevel::Any,
            SecurityLevel::SecureSoftware,
            SecurityLevel::SecureHardware,
        ];
        let map = levels
            .into_iter()
            .map(|level| {
                let name = level.js_name();
                (name.to_string(), Value::String(name.to_string()))
            })
            .collect::<serde_json::Map<_, _>>();
        Value::Object(map)
    }

    /// Invoke `method` with `args`, settling `promise` exactly once.
    pub async fn call(&self, method: &str, args: &[Value], promise: Promise) {
        let request = match Request::parse(method, args) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(method = %method, error = %e, "rejecting malformed call");
                promise.reject(e.to_args());
                return;
            }
        };

        match request {
            Request::Get(options) => {
                self.bridge
                    .get_generic_password_for_options(&options, promise)
                    .await;
            }
            Request::Has(options) => {
                self.bridge
                    .has_generic_password_for_options(&options, promise)
                    .await;
            }
            Request::Set {
                options,
                username,
                password,
                min_security_level,
            } => {
                self.bridge
                    .set_generic_password_for_options(
                        &options,
                        username,
                        password,
                        min_security_level,
                        promise,
                    )
                    .await;
            }
            Request::Reset(options) => {
                self.bridge
                    .reset_generic_password_for_options(&options, promise)
                    .await;
            }
            Request::SetUsername(username) => self.bridge.set_username(username, promise),
        }
    }

    /// Run one protocol [`Call`] to completion.
    pub async fn handle(&self, call: Call) -> Reply {
        let (promise, rx) = Promise::channel();
        self.call(&call.method, &call.args, promise).await;
        let settlement = rx.await.unwrap_or(Settlement::Rejected(Vec::new()));
        Reply::new(call.id, settlement)
    }
}
