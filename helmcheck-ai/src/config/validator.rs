//! Configuration validation utilities

use super::error::{ConfigResult, ValidationError, ValidationErrorKind};
use super::schema::{AiConfig, ProviderConfig, RateLimitConfig};
use std::collections::HashSet;
use url::Url;

/// Eviction strategies the cache implements
const EVICTION_POLICIES: [&str; 1] = ["lru"];

/// Checks a configuration before any provider is constructed
#[derive(Debug, Clone)]
pub struct ConfigValidator {
    supported_types: Vec<String>,
}

impl ConfigValidator {
    /// Validator accepting the given provider type tags
    pub fn new(supported_types: Vec<String>) -> Self {
        Self {
            supported_types: supported_types
                .into_iter()
                .map(|t| t.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn validate(&self, config: &AiConfig) -> ConfigResult<()> {
        if config.providers.is_empty() {
            return Err(ValidationError::required("ai.providers")
                .with_context("at least one provider must be configured")
                .into());
        }

        let mut seen_names = HashSet::new();
        for (i, provider) in config.providers.iter().enumerate() {
            let path = format!("ai.providers[{}]", i);
            if !provider.name.is_empty() && !seen_names.insert(provider.name.as_str()) {
                return Err(ValidationError::new(
                    format!("{}.name", path),
                    ValidationErrorKind::DuplicateValue {
                        value: provider.name.clone(),
                    },
                )
                .into());
            }
            self.validate_provider(provider, &path)?;
        }

        if config.enabled_providers().is_empty() {
            return Err(ValidationError::invalid_value(
                "ai.providers",
                "at least one enabled provider",
                "none",
            )
            .into());
        }

        if config.caching.enabled && config.caching.ttl < 0 {
            return Err(ValidationError::out_of_range("ai.caching.ttl", "TTL must be non-negative").into());
        }
        if !EVICTION_POLICIES.contains(&config.caching.eviction_policy.to_ascii_lowercase().as_str()) {
            return Err(ValidationError::invalid_value(
                "ai.caching.eviction_policy",
                EVICTION_POLICIES.join(", "),
                config.caching.eviction_policy.clone(),
            )
            .into());
        }

        validate_rate_limits(&config.rate_limiting, "ai.rate_limiting")?;
        Ok(())
    }

    fn validate_provider(&self, provider: &ProviderConfig, path: &str) -> ConfigResult<()> {
        if provider.name.is_empty() {
            return Err(ValidationError::required(format!("{}.name", path)).into());
        }
        if provider.provider_type.is_empty() {
            return Err(ValidationError::required(format!("{}.type", path)).into());
        }
        if !self
            .supported_types
            .contains(&provider.provider_type.to_ascii_lowercase())
        {
            return Err(ValidationError::invalid_value(
                format!("{}.type", path),
                self.supported_types.join(", "),
                provider.provider_type.clone(),
            )
            .with_context("unsupported provider type")
            .into());
        }
        if !provider.auth.has_credentials() {
            return Err(ValidationError::required(format!("{}.auth", path))
                .with_context("at least one authentication method must be provided")
                .into());
        }
        if provider.priority < 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.priority", path),
                "priority must be non-negative",
            )
            .into());
        }

        if let Some(base_url) = provider.settings.get("base_url").and_then(|v| v.as_str()) {
            validate_url(base_url, &format!("{}.config.base_url", path))?;
        }

        validate_rate_limits(&provider.rate_limits, &format!("{}.rate_limits", path))?;

        let retry = &provider.retry;
        let retry_path = format!("{}.retry", path);
        for (field, value) in [
            ("max_retries", retry.max_retries),
            ("initial_delay_ms", retry.initial_delay_ms),
            ("max_delay_ms", retry.max_delay_ms),
        ] {
            if value.is_some_and(|v| v < 0) {
                return Err(ValidationError::out_of_range(
                    format!("{}.{}", retry_path, field),
                    "must be non-negative",
                )
                .into());
            }
        }
        if retry.multiplier.is_some_and(|m| m < 1.0) {
            return Err(ValidationError::out_of_range(
                format!("{}.multiplier", retry_path),
                "must be at least 1.0",
            )
            .into());
        }

        if provider.cache.as_ref().and_then(|c| c.ttl).is_some_and(|ttl| ttl < 0) {
            return Err(ValidationError::out_of_range(
                format!("{}.cache.ttl", path),
                "TTL must be non-negative",
            )
            .into());
        }
        Ok(())
    }
}

fn validate_rate_limits(limits: &RateLimitConfig, path: &str) -> ConfigResult<()> {
    for (field, value) in [
        ("requests_per_minute", limits.requests_per_minute),
        ("requests_per_hour", limits.requests_per_hour),
        ("tokens_per_minute", limits.tokens_per_minute),
        ("max_concurrent", limits.max_concurrent),
    ] {
        if value.is_some_and(|v| v < 0) {
            return Err(ValidationError::out_of_range(
                format!("{}.{}", path, field),
                format!("{} must be non-negative", field),
            )
            .into());
        }
    }
    Ok(())
}

fn validate_url(raw: &str, path: &str) -> ConfigResult<()> {
    match Url::parse(raw) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(()),
        Ok(url) => Err(ValidationError::new(
            path,
            ValidationErrorKind::InvalidUrl {
                message: format!("URL scheme must be http or https, got: {}", url.scheme()),
            },
        )
        .into()),
        Err(e) => Err(ValidationError::new(
            path,
            ValidationErrorKind::InvalidUrl {
                message: e.to_string(),
            },
        )
        .into()),
    }
}
