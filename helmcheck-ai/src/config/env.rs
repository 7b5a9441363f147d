//! Environment variable interpolation and overrides for configuration

use super::error::ConfigError;
use super::schema::AiConfig;
use super::secrets::{redact_by_field_name, RedactionPolicy};
use regex::Regex;
use std::env;
use std::sync::LazyLock;
use tracing::{debug, warn};

static ENV_VAR_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").ok());

/// Interpolate `${VAR}` references in configuration text
pub fn interpolate_env_vars(content: &str) -> Result<String, ConfigError> {
    interpolate_with(content, |var| env::var(var).ok())
}

/// Interpolate using `lookup`; the first unresolved variable is an error
pub fn interpolate_with(
    content: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let Some(pattern) = ENV_VAR_PATTERN.as_ref() else {
        return Ok(content.to_string());
    };

    let mut result = String::with_capacity(content.len());
    let mut last = 0;
    for caps in pattern.captures_iter(content) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = lookup(name.as_str()).ok_or_else(|| ConfigError::EnvVarNotFound {
            var: name.as_str().to_string(),
        })?;
        result.push_str(&content[last..whole.start()]);
        result.push_str(&value);
        last = whole.end();
    }
    result.push_str(&content[last..]);
    Ok(result)
}

/// Names of the variables referenced by `content`
pub fn referenced_vars(content: &str) -> Vec<String> {
    ENV_VAR_PATTERN
        .as_ref()
        .map(|pattern| {
            pattern
                .captures_iter(content)
                .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
                .collect()
        })
        .unwrap_or_default()
}

/// Apply `AI_*` overrides from the process environment
pub fn apply_env_overrides(config: &mut AiConfig) {
    apply_overrides_with(config, |var| env::var(var).ok().filter(|v| !v.is_empty()));
}

fn parse_flag(value: &str) -> bool {
    value == "true" || value == "1"
}

/// Apply overrides resolved through `lookup`; malformed numbers are ignored
pub fn apply_overrides_with(config: &mut AiConfig, lookup: impl Fn(&str) -> Option<String>) {
    let read = |var: &str| {
        let value = lookup(var)?;
        debug!(
            var,
            value = %redact_by_field_name(var, &value, RedactionPolicy::default()),
            "applying environment override"
        );
        Some(value)
    };

    if let Some(value) = read("AI_CACHE_ENABLED") {
        config.caching.enabled = parse_flag(&value);
    }
    if let Some(value) = read("AI_CACHE_TTL") {
        match value.trim().parse() {
            Ok(ttl) => config.caching.ttl = ttl,
            Err(_) => warn!(var = "AI_CACHE_TTL", "ignoring non-numeric override"),
        }
    }
    if let Some(value) = read("AI_CACHE_MAX_SIZE") {
        match value.parse() {
            Ok(size) => config.caching.max_size = Some(size),
            Err(e) => warn!(var = "AI_CACHE_MAX_SIZE", error = %e, "ignoring invalid override"),
        }
    }
    if let Some(value) = read("AI_RATE_LIMIT_RPM") {
        match value.trim().parse() {
            Ok(rpm) => config.rate_limiting.requests_per_minute = Some(rpm),
            Err(_) => warn!(var = "AI_RATE_LIMIT_RPM", "ignoring non-numeric override"),
        }
    }

    for provider in &mut config.providers {
        let prefix = format!("AI_PROVIDER_{}_", provider.name.to_uppercase().replace('-', "_"));

        if let Some(value) = read(&format!("{}ENABLED", prefix)) {
            provider.enabled = parse_flag(&value);
        }
        if let Some(value) = read(&format!("{}PRIORITY", prefix)) {
            if let Ok(priority) = value.trim().parse() {
                provider.priority = priority;
            }
        }
        if let Some(value) = read(&format!("{}TOKEN", prefix)) {
            provider.auth.token = Some(value.into());
        }
        if let Some(value) = read(&format!("{}API_KEY", prefix)) {
            provider.auth.api_key = Some(value.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ProviderConfig;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_interpolate_env_vars() {
        let result = interpolate_with("api_key: ${TEST_VAR}", lookup(&[("TEST_VAR", "test_value")])).unwrap();
        assert_eq!(result, "api_key: test_value");
    }

    #[test]
    fn test_missing_env_var() {
        let result = interpolate_with("api_key: ${MISSING_VAR}", lookup(&[]));
        match result {
            Err(ConfigError::EnvVarNotFound { var }) => assert_eq!(var, "MISSING_VAR"),
            other => panic!("Expected EnvVarNotFound error, got {other:?}"),
        }
    }

    #[test]
    fn test_multiple_env_vars() {
        let result = interpolate_with(
            "key1: ${VAR1}, key2: ${VAR2}, again: ${VAR1}",
            lookup(&[("VAR1", "value1"), ("VAR2", "value2")]),
        )
        .unwrap();
        assert_eq!(result, "key1: value1, key2: value2, again: value1");
    }

    #[test]
    fn test_referenced_vars() {
        let vars = referenced_vars("api_key: ${OPENAI_API_KEY}, url: ${API_BASE_URL}");
        assert_eq!(vars, vec!["OPENAI_API_KEY", "API_BASE_URL"]);
    }

    #[test]
    fn test_overrides() {
        let mut config = AiConfig {
            providers: vec![ProviderConfig {
                name: "openai-default".into(),
                provider_type: "openai".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        apply_overrides_with(
            &mut config,
            lookup(&[
                ("AI_CACHE_ENABLED", "1"),
                ("AI_CACHE_TTL", "120"),
                ("AI_CACHE_MAX_SIZE", "10MB"),
                ("AI_RATE_LIMIT_RPM", "not-a-number"),
                ("AI_PROVIDER_OPENAI_DEFAULT_ENABLED", "false"),
                ("AI_PROVIDER_OPENAI_DEFAULT_PRIORITY", "7"),
                ("AI_PROVIDER_OPENAI_DEFAULT_API_KEY", "sk-override"),
            ]),
        );

        assert!(config.caching.enabled);
        assert_eq!(config.caching.ttl, 120);
        assert_eq!(config.caching.max_size_bytes(), 10 * 1024 * 1024);
        assert_eq!(config.rate_limiting.requests_per_minute, None);

        let provider = &config.providers[0];
        assert!(!provider.enabled);
        assert_eq!(provider.priority, 7);
        assert_eq!(
            provider.auth.api_key.as_ref().map(|k| k.expose_secret()),
            Some("sk-override")
        );
    }
}
