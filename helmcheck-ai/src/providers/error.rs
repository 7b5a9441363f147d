//! Provider error types and classification
//!
//! Every failure surfaced by a provider, decorator or chain is a
//! [`ProviderError`]. Errors are `Clone` so they can be carried inside stream
//! chunks and aggregated by the fallback chain.

use std::time::Duration;
use thiserror::Error;

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors that can occur when interacting with AI providers
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// No factory is registered for the backend type tag
    #[error("provider type not supported: {0}")]
    NotSupported(String),

    /// Authentication or settings are missing
    #[error("provider '{provider}' not configured: {reason}")]
    NotConfigured { provider: String, reason: String },

    /// Transient backend outage (5xx, connection failure)
    #[error("provider '{provider}' unavailable: {reason}")]
    Unavailable { provider: String, reason: String },

    /// Backend or local limiter refused the call
    #[error("rate limit exceeded for '{provider}': {limit}")]
    RateLimitExceeded {
        provider: String,
        limit: String,
        retry_after: Option<Duration>,
    },

    /// Malformed caller input
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Backend returned unparseable or unexpected data
    #[error("invalid response from '{provider}': {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("authentication failed for '{provider}': {reason}")]
    AuthenticationFailed { provider: String, reason: String },

    #[error("quota exceeded for '{provider}': {reason}")]
    QuotaExceeded { provider: String, reason: String },

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("operation cancelled")]
    Cancelled,

    /// Capacity or serialization problem inside a cache
    #[error("cache {operation} failed: {reason}")]
    Cache { operation: String, reason: String },

    #[error("invalid configuration at '{field}': {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// Every member of a fallback chain failed
    #[error("all {} providers failed, last error: {}", .errors.len(), last_message(.errors))]
    AllProvidersFailed { errors: Vec<ProviderError> },

    /// Aggregate from operations run against several providers
    #[error("{} provider errors: {}", .errors.len(), join_messages(.errors))]
    Multiple { errors: Vec<ProviderError> },

    #[error("token limit exceeded: requested {requested}, limit {limit}")]
    TokenLimitExceeded { requested: u64, limit: u64 },

    /// A retryable error that persisted through every allowed attempt
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ProviderError>,
    },
}

fn last_message(errors: &[ProviderError]) -> String {
    errors
        .last()
        .map(ToString::to_string)
        .unwrap_or_else(|| "none".to_string())
}

fn join_messages(errors: &[ProviderError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ProviderError {
    /// Whether a retry against the same provider may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::RateLimitExceeded { .. } | Self::Timeout(_)
        )
    }

    /// Errors that must never be retried, whatever the configured patterns say
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::NotSupported(_)
                | Self::NotConfigured { .. }
                | Self::InvalidRequest(_)
                | Self::AuthenticationFailed { .. }
                | Self::QuotaExceeded { .. }
                | Self::Cancelled
                | Self::InvalidConfiguration { .. }
                | Self::TokenLimitExceeded { .. }
                | Self::RetriesExhausted { .. }
        )
    }

    /// Backend-suggested wait before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExceeded { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Stable classification string used as the error histogram key
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotSupported(_) => "not_supported",
            Self::NotConfigured { .. } => "not_configured",
            Self::Unavailable { .. } => "unavailable",
            Self::RateLimitExceeded { .. } => "rate_limit",
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidResponse { .. } => "invalid_response",
            Self::AuthenticationFailed { .. } => "authentication",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::Cache { .. } => "cache",
            Self::InvalidConfiguration { .. } => "invalid_configuration",
            Self::AllProvidersFailed { .. } => "all_providers_failed",
            Self::Multiple { .. } => "multiple",
            Self::TokenLimitExceeded { .. } => "token_limit",
            Self::RetriesExhausted { last, .. } => last.kind(),
        }
    }

    /// The last individual failure of an exhausted chain
    pub fn last_error(&self) -> Option<&ProviderError> {
        match self {
            Self::AllProvidersFailed { errors } | Self::Multiple { errors } => errors.last(),
            _ => None,
        }
    }

    /// Strip the retry annotation
    pub fn root(&self) -> &ProviderError {
        match self {
            Self::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }

    /// Collapse a list of errors into `Ok`, a single error, or `Multiple`
    pub fn aggregate(mut errors: Vec<ProviderError>) -> ProviderResult<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Multiple { errors }),
        }
    }

    pub(crate) fn unavailable(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_response(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_configured(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotConfigured {
            provider: provider.into(),
            reason: reason.into(),
        }
    }
}
