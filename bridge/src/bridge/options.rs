//! Call options sent by the runtime alongside each operation.
//!
//! Options never change which namespace a call addresses; they are parsed
//! for diagnostics and for authentication prompt signalling.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_PROMPT_TITLE: &str = "Authenticate to retrieve secret";
pub const DEFAULT_PROMPT_CANCEL: &str = "Cancel";

/// Minimum security level a caller may request for a stored secret.
///
/// Ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityLevel {
    Any,
    SecureSoftware,
    SecureHardware,
}

impl SecurityLevel {
    /// Parse `ANY` / `SECURE_SOFTWARE` / `SECURE_HARDWARE`, with or without
    /// the `SECURITY_LEVEL_` prefix used by the runtime constants.
    pub fn parse(value: &str) -> Option<Self> {
        match value.strip_prefix("SECURITY_LEVEL_").unwrap_or(value) {
            "ANY" => Some(SecurityLevel::Any),
            "SECURE_SOFTWARE" => Some(SecurityLevel::SecureSoftware),
            "SECURE_HARDWARE" => Some(SecurityLevel::SecureHardware),
            _ => None,
        }
    }

    /// Name of the constant exported to the runtime.
    pub fn js_name(self) -> &'static str {
        match self {
            SecurityLevel::Any => "SECURITY_LEVEL_ANY",
            SecurityLevel::SecureSoftware => "SECURITY_LEVEL_SECURE_SOFTWARE",
            SecurityLevel::SecureHardware => "SECURITY_LEVEL_SECURE_HARDWARE",
        }
    }
}

/// Text shown by the OS authentication prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationPrompt {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel: Option<String>,
}

impl Default for AuthenticationPrompt {
    fn default() -> Self {
        Self {
            title: Some(DEFAULT_PROMPT_TITLE.to_string()),
            subtitle: None,
            description: None,
            cancel: Some(DEFAULT_PROMPT_CANCEL.to_string()),
        }
    }
}

impl AuthenticationPrompt {
    /// Overlay the fields set in `other` on top of `self`.
    fn merged(mut self, other: AuthenticationPrompt) -> Self {
        self.title = other.title.or(self.title);
        self.subtitle = other.subtitle.or(self.subtitle);
        self.description = other.description.or(self.description);
        self.cancel = other.cancel.or(self.cancel);
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PromptArg {
    Title(String),
    Prompt(AuthenticationPrompt),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOptions {
    service: Option<String>,
    accessible: Option<String>,
    access_control: Option<String>,
    access_group: Option<String>,
    authentication_type: Option<String>,
    security_level: Option<String>,
    storage: Option<String>,
    rules: Option<String>,
    authentication_prompt: Option<PromptArg>,
}

/// Normalized call options.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    pub service: Option<String>,
    pub accessible: Option<String>,
    pub access_control: Option<String>,
    pub access_group: Option<String>,
    pub authentication_type: Option<String>,
    pub security_level: Option<String>,
    pub storage: Option<String>,
    pub rules: Option<String>,
    pub authentication_prompt: AuthenticationPrompt,
}

impl Options {
    /// Normalize the raw `options` argument.
    ///
    /// Accepts `null`, an options object, or (deprecated) a bare service
    /// name string.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        let raw = match value {
            Value::Null => RawOptions::default(),
            Value::String(service) => {
                tracing::warn!(
                    service = %service,
                    "passing a service string as options is deprecated, use {{ service }}"
                );
                RawOptions {
                    service: Some(service.clone()),
                    ..RawOptions::default()
                }
            }
            other => RawOptions::deserialize(other)?,
        };

        let authentication_prompt = match raw.authentication_prompt {
            None => AuthenticationPrompt::default(),
            Some(PromptArg::Title(title)) => {
                tracing::warn!(
                    "passing authenticationPrompt as a string is deprecated, use {{ title }}"
                );
                AuthenticationPrompt::default().merged(AuthenticationPrompt {
                    title: Some(title),
                    subtitle: None,
                    description: None,
                    cancel: None,
                })
            }
            Some(PromptArg::Prompt(prompt)) => AuthenticationPrompt::default().merged(prompt),
        };

        Ok(Self {
            service: raw.service,
            accessible: raw.accessible,
            access_control: raw.access_control,
            access_group: raw.access_group,
            authentication_type: raw.authentication_type,
            security_level: raw.security_level,
            storage: raw.storage,
            rules: raw.rules,
            authentication_prompt,
        })
    }

    /// Whether the OS may show an authentication prompt for this call.
    pub fn requires_authentication(&self) -> bool {
        self.access_control.is_some()
    }
}
