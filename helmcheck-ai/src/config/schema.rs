//! Configuration schema structures with serde support

use super::secrets::SecretString;
use super::size::{parse_duration, ByteSize};
use crate::providers::error::{ProviderError, ProviderResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Default response cache budget (100MB)
pub const DEFAULT_CACHE_SIZE: ByteSize = ByteSize::mb(100);

/// Default response cache TTL in seconds
pub const DEFAULT_CACHE_TTL_SECS: i64 = 3600;

/// Default global requests per minute
pub const DEFAULT_REQUESTS_PER_MINUTE: i64 = 60;

/// Root configuration document
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct HelmcheckConfig {
    #[serde(default)]
    pub ai: AiConfig,
}

/// AI provider section
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AiConfig {
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    #[serde(default)]
    pub caching: CachingConfig,

    /// Limits inherited by providers that do not set their own
    #[serde(default)]
    pub rate_limiting: RateLimitConfig,
}

impl AiConfig {
    /// Enabled providers, lowest priority value first; ties keep file order
    pub fn enabled_providers(&self) -> Vec<&ProviderConfig> {
        let mut enabled: Vec<_> = self.providers.iter().filter(|p| p.enabled).collect();
        enabled.sort_by_key(|p| p.priority);
        enabled
    }

    pub fn provider_by_name(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    pub fn providers_by_type(&self, provider_type: &str) -> Vec<&ProviderConfig> {
        self.providers
            .iter()
            .filter(|p| p.provider_type.eq_ignore_ascii_case(provider_type))
            .collect()
    }

    /// Fill unset values with defaults
    pub fn merge_with_defaults(&mut self) {
        if self.caching.ttl == 0 {
            self.caching.ttl = DEFAULT_CACHE_TTL_SECS;
        }
        if self.caching.max_size.is_none() {
            self.caching.max_size = Some(DEFAULT_CACHE_SIZE);
        }
        if matches!(self.rate_limiting.requests_per_minute, None | Some(0)) {
            self.rate_limiting.requests_per_minute = Some(DEFAULT_REQUESTS_PER_MINUTE);
        }

        let caching = self.caching.clone();
        for provider in &mut self.providers {
            let retry = &mut provider.retry;
            retry.max_retries.get_or_insert(3);
            retry.initial_delay_ms.get_or_insert(1_000);
            retry.max_delay_ms.get_or_insert(30_000);
            retry.multiplier.get_or_insert(2.0);

            let cache = provider.cache.get_or_insert_with(CacheConfig::default);
            if cache.ttl.is_none() {
                cache.ttl = Some(caching.ttl);
            }
            if cache.enabled.is_none() && caching.enabled {
                cache.enabled = Some(true);
            }
        }
    }
}

/// Shared response cache settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CachingConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<ByteSize>,

    #[serde(default = "default_eviction_policy")]
    pub eviction_policy: String,
}

impl Default for CachingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl: DEFAULT_CACHE_TTL_SECS,
            max_size: None,
            eviction_policy: default_eviction_policy(),
        }
    }
}

impl CachingConfig {
    pub fn ttl_duration(&self) -> Duration {
        Duration::from_secs(self.ttl.max(0) as u64)
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size.unwrap_or(DEFAULT_CACHE_SIZE).as_u64()
    }
}

/// Request admission limits; unset fields inherit, zero means unlimited
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_minute: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_hour: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_per_minute: Option<i64>,

    #[serde(default, alias = "concurrent_requests", skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<i64>,
}

impl RateLimitConfig {
    /// These limits with unset fields taken from `global`
    pub fn inherit(&self, global: &RateLimitConfig) -> Self {
        Self {
            requests_per_minute: self.requests_per_minute.or(global.requests_per_minute),
            requests_per_hour: self.requests_per_hour.or(global.requests_per_hour),
            tokens_per_minute: self.tokens_per_minute.or(global.tokens_per_minute),
            max_concurrent: self.max_concurrent.or(global.max_concurrent),
        }
    }
}

/// One configured backend instance
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Unique instance name
    #[serde(default)]
    pub name: String,

    /// Registry type tag, e.g. `openai` or `copilot`
    #[serde(rename = "type", default)]
    pub provider_type: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Lower values are tried first
    #[serde(default)]
    pub priority: i64,

    #[serde(default)]
    pub auth: AuthConfig,

    /// Backend specific settings (`model`, `base_url`, `temperature`, ...)
    #[serde(default, alias = "config", skip_serializing_if = "BTreeMap::is_empty")]
    pub settings: BTreeMap<String, Value>,

    #[serde(default, alias = "rate_limit")]
    pub rate_limits: RateLimitConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheConfig>,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            provider_type: String::new(),
            enabled: true,
            priority: 0,
            auth: AuthConfig::default(),
            settings: BTreeMap::new(),
            rate_limits: RateLimitConfig::default(),
            cache: None,
            retry: RetryConfig::default(),
        }
    }
}

impl ProviderConfig {
    fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key).filter(|v| !v.is_null())
    }

    fn wrong_type(&self, key: &str, expected: &str) -> ProviderError {
        ProviderError::InvalidConfiguration {
            field: format!("{}.config.{}", self.name, key),
            reason: format!("expected {}", expected),
        }
    }

    pub fn setting_str(&self, key: &str) -> ProviderResult<Option<String>> {
        match self.setting(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.wrong_type(key, "a string")),
        }
    }

    pub fn setting_f64(&self, key: &str) -> ProviderResult<Option<f64>> {
        match self.setting(key) {
            None => Ok(None),
            Some(v) => v.as_f64().map(Some).ok_or_else(|| self.wrong_type(key, "a number")),
        }
    }

    pub fn setting_u64(&self, key: &str) -> ProviderResult<Option<u64>> {
        match self.setting(key) {
            None => Ok(None),
            Some(v) => v
                .as_u64()
                .map(Some)
                .ok_or_else(|| self.wrong_type(key, "a non-negative integer")),
        }
    }

    /// Seconds as a number, or a string such as `"30s"`
    pub fn setting_duration(&self, key: &str) -> ProviderResult<Option<Duration>> {
        match self.setting(key) {
            None => Ok(None),
            Some(Value::String(s)) => parse_duration(s)
                .map(Some)
                .map_err(|reason| ProviderError::InvalidConfiguration {
                    field: format!("{}.config.{}", self.name, key),
                    reason,
                }),
            Some(v) => v
                .as_u64()
                .map(|secs| Some(Duration::from_secs(secs)))
                .ok_or_else(|| self.wrong_type(key, "seconds or a duration string")),
        }
    }

    /// Whether responses from this provider may be cached
    pub fn cache_enabled(&self) -> bool {
        self.cache.as_ref().and_then(|c| c.enabled).unwrap_or(true)
    }

    /// Provider specific TTL, when set and positive
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache
            .as_ref()
            .and_then(|c| c.ttl)
            .filter(|ttl| *ttl > 0)
            .map(|ttl| Duration::from_secs(ttl as u64))
    }
}

/// Credentials; at least one method must be present
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<SecretString>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<SecretString>,

    /// Environment variable holding the credential, read per request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<SecretString>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional: BTreeMap<String, SecretString>,
}

impl AuthConfig {
    pub fn has_credentials(&self) -> bool {
        let present = |secret: &Option<SecretString>| secret.as_ref().is_some_and(|s| !s.is_empty());
        present(&self.token)
            || present(&self.api_key)
            || self.token_env.as_deref().is_some_and(|v| !v.is_empty())
            || (self.username.as_deref().is_some_and(|u| !u.is_empty()) && present(&self.password))
            || !self.additional.is_empty()
    }
}

/// Per-provider cache overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
}

/// Retry settings; unset fields use the policy defaults
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<i64>,

    #[serde(default, alias = "initial_delay", skip_serializing_if = "Option::is_none")]
    pub initial_delay_ms: Option<i64>,

    #[serde(default, alias = "max_delay", skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<f64>,

    /// Message substrings that mark an error as transient
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retryable_errors: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> i64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_eviction_policy() -> String {
    "lru".to_string()
}
