//! Secrets management and redaction for configuration
//!
//! Credentials are held in [`SecretString`], which never prints its value.
//! Values logged by field name go through [`redact_by_field_name`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// A wrapper type for sensitive strings like API keys
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SecretString {
    value: String,
}

impl SecretString {
    /// Create a new secret string
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Get the actual value (use with caution)
    pub fn expose_secret(&self) -> &str {
        &self.value
    }

    /// Check if the secret is empty
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Get a partially redacted version for debugging
    pub fn partial_redact(&self) -> String {
        if self.value.is_empty() {
            return "[EMPTY]".to_string();
        }

        let chars: Vec<char> = self.value.chars().collect();
        let len = chars.len();
        if len <= 8 {
            return "[REDACTED]".to_string();
        }

        let head = if self.value.starts_with("sk-") || self.value.starts_with("gh") {
            3
        } else {
            2
        };
        let tail = if head == 3 { 4 } else { 2 };
        let start: String = chars[..head].iter().collect();
        let end: String = chars[len - tail..].iter().collect();
        format!("{}...{}", start, end)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// How much of a sensitive value may appear in logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RedactionPolicy {
    /// Fully redact all sensitive fields
    #[default]
    Full,
    /// Keep the first two characters
    Partial,
    /// No redaction, for local debugging only
    None,
}

const SENSITIVE_PATTERNS: [&str; 9] = [
    "api_key",
    "secret",
    "token",
    "password",
    "credential",
    "auth",
    "private",
    "passphrase",
    "key",
];

/// Whether a field or variable name suggests a credential
pub fn is_sensitive_field(field_name: &str) -> bool {
    let lower = field_name.to_lowercase();
    SENSITIVE_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// Redact `value` if `field_name` looks sensitive
pub fn redact_by_field_name(field_name: &str, value: &str, policy: RedactionPolicy) -> String {
    if !is_sensitive_field(field_name) {
        return value.to_string();
    }
    match policy {
        RedactionPolicy::Full => "[REDACTED]".to_string(),
        RedactionPolicy::Partial => {
            if value.chars().count() <= 4 {
                "[REDACTED]".to_string()
            } else {
                format!("{}...", value.chars().take(2).collect::<String>())
            }
        }
        RedactionPolicy::None => value.to_string(),
    }
}
