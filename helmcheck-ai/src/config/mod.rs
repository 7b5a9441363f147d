//! Configuration module for helmcheck
//!
//! Loads the `ai` section of the helmcheck configuration from YAML or JSON,
//! interpolating `${VAR}` references before parsing, then applies `AI_*`
//! environment overrides and defaults, and validates the result.

mod env;
mod error;
mod schema;
mod secrets;
mod size;
mod validator;

pub use env::{
    apply_env_overrides, apply_overrides_with, interpolate_env_vars, interpolate_with,
    referenced_vars,
};
pub use error::{ConfigError, ConfigResult, ValidationError, ValidationErrorKind};
pub use schema::{
    AiConfig, AuthConfig, CacheConfig, CachingConfig, HelmcheckConfig, ProviderConfig,
    RateLimitConfig, RetryConfig, DEFAULT_CACHE_SIZE, DEFAULT_CACHE_TTL_SECS,
    DEFAULT_REQUESTS_PER_MINUTE,
};
pub use secrets::{is_sensitive_field, redact_by_field_name, RedactionPolicy, SecretString};
pub use size::{parse_duration, parse_size, ByteSize};
pub use validator::ConfigValidator;

use crate::providers::ProviderKind;
use serde_json::json;
use std::fs;
use std::path::Path;
use tracing::info;

fn read_file(path: &Path) -> ConfigResult<String> {
    fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_string_lossy().to_string(),
        source: e,
    })
}

fn default_validator() -> ConfigValidator {
    ConfigValidator::new(
        ProviderKind::ALL
            .iter()
            .map(|kind| kind.as_str().to_string())
            .collect(),
    )
}

/// Overrides, defaults and validation applied after every parse
fn finish(mut config: HelmcheckConfig, source: &str) -> ConfigResult<HelmcheckConfig> {
    apply_env_overrides(&mut config.ai);
    config.ai.merge_with_defaults();
    default_validator().validate(&config.ai)?;
    info!(
        source,
        providers = config.ai.providers.len(),
        caching = config.ai.caching.enabled,
        "configuration loaded"
    );
    Ok(config)
}

/// Parse YAML text; `path` only labels errors
pub fn from_yaml_str(content: &str, path: &str) -> ConfigResult<HelmcheckConfig> {
    let interpolated = interpolate_env_vars(content)?;
    let config: HelmcheckConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::ParseError {
            path: path.to_string(),
            line: e.location().map(|l| l.line()),
            column: e.location().map(|l| l.column()),
            message: e.to_string(),
        })?;
    finish(config, path)
}

/// Parse JSON text; `path` only labels errors
pub fn from_json_str(content: &str, path: &str) -> ConfigResult<HelmcheckConfig> {
    let interpolated = interpolate_env_vars(content)?;
    let config: HelmcheckConfig =
        serde_json::from_str(&interpolated).map_err(|e| ConfigError::ParseError {
            path: path.to_string(),
            line: Some(e.line()),
            column: Some(e.column()),
            message: e.to_string(),
        })?;
    finish(config, path)
}

/// Load a configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> ConfigResult<HelmcheckConfig> {
    let path = path.as_ref();
    let content = read_file(path)?;
    from_yaml_str(&content, &path.to_string_lossy())
}

/// Load a configuration from a JSON file
pub fn load_from_json<P: AsRef<Path>>(path: P) -> ConfigResult<HelmcheckConfig> {
    let path = path.as_ref();
    let content = read_file(path)?;
    from_json_str(&content, &path.to_string_lossy())
}

/// Serialize back to YAML
pub fn to_yaml(config: &HelmcheckConfig) -> ConfigResult<String> {
    serde_yaml::to_string(config).map_err(|e| ConfigError::Serialize {
        message: e.to_string(),
    })
}

/// A single OpenAI provider reading its key from `OPENAI_API_KEY`
pub fn default_config() -> HelmcheckConfig {
    let mut settings = std::collections::BTreeMap::new();
    settings.insert("model".to_string(), json!("gpt-4-turbo"));
    settings.insert("temperature".to_string(), json!(0.3));
    settings.insert("max_tokens".to_string(), json!(4096));

    HelmcheckConfig {
        ai: AiConfig {
            providers: vec![ProviderConfig {
                name: "openai-default".to_string(),
                provider_type: ProviderKind::OpenAI.as_str().to_string(),
                enabled: true,
                priority: 1,
                auth: AuthConfig {
                    token_env: Some("OPENAI_API_KEY".to_string()),
                    ..Default::default()
                },
                settings,
                cache: Some(CacheConfig {
                    enabled: Some(true),
                    ttl: Some(DEFAULT_CACHE_TTL_SECS),
                }),
                retry: RetryConfig {
                    max_retries: Some(3),
                    initial_delay_ms: Some(1_000),
                    max_delay_ms: Some(30_000),
                    multiplier: Some(2.0),
                    retryable_errors: Vec::new(),
                },
                ..Default::default()
            }],
            caching: CachingConfig {
                enabled: true,
                ttl: DEFAULT_CACHE_TTL_SECS,
                max_size: Some(DEFAULT_CACHE_SIZE),
                ..Default::default()
            },
            rate_limiting: RateLimitConfig {
                requests_per_minute: Some(DEFAULT_REQUESTS_PER_MINUTE),
                tokens_per_minute: Some(100_000),
                ..Default::default()
            },
        },
    }
}
