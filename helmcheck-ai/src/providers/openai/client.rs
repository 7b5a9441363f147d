//! OpenAI client implementation

use super::converter::JsonMode;
use super::endpoint::{ChatEndpoint, Dialect};
use super::pricing::calculate_cost;
use super::settings::ChatSettings;
use crate::config::ProviderConfig;
use crate::context::Context;
use crate::http::{token_source, Credential, TokenFormat, TokenSource};
use crate::metrics::UsageMetrics;
use crate::protocol::{Request, Response};
use crate::providers::adapter::{ChunkStream, Provider};
use crate::providers::error::ProviderResult;
use crate::providers::rate_limit::RateLimits;
use crate::providers::retry::RetryPolicy;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// OpenAI provider implementation
pub struct OpenAIProvider {
    endpoint: ChatEndpoint,
}

impl OpenAIProvider {
    /// Name used when the configuration leaves it empty
    pub const DEFAULT_NAME: &'static str = "openai";

    /// Environment variable read when no credential is configured
    pub const API_KEY_ENV: &'static str = "OPENAI_API_KEY";

    /// Create a provider; the credential is format-checked immediately
    pub fn new(
        name: impl Into<String>,
        settings: ChatSettings,
        source: Arc<dyn TokenSource>,
        limits: RateLimits,
        retry: RetryPolicy,
    ) -> ProviderResult<Self> {
        let model = settings.model.clone();
        let dialect = Dialect {
            token_format: TokenFormat::OpenAIKey,
            json_mode: JsonMode::Native,
            cost: Arc::new(move |prompt, completion| calculate_cost(prompt, completion, &model)),
        };
        let endpoint = ChatEndpoint::new(name.into(), settings, source, dialect, limits, retry)?;
        Ok(Self { endpoint })
    }

    pub fn from_config(config: &ProviderConfig) -> ProviderResult<Self> {
        let settings = ChatSettings::openai_defaults().overlay(config)?;
        let name = if config.name.is_empty() {
            Self::DEFAULT_NAME.to_string()
        } else {
            config.name.clone()
        };
        let source = token_source(&config.auth, Credential::ApiKey, Self::API_KEY_ENV);
        Self::new(
            name,
            settings,
            source,
            RateLimits::resolve(&config.rate_limits, &Default::default()),
            RetryPolicy::from(&config.retry),
        )
    }

    pub fn settings(&self) -> &ChatSettings {
        self.endpoint.settings()
    }

    /// Identifiers of the models the key can use
    pub async fn list_models(&self, ctx: &Context) -> ProviderResult<Vec<String>> {
        let list = self.endpoint.list_models(ctx).await?;
        Ok(list.data.into_iter().map(|model| model.id).collect())
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &str {
        self.endpoint.name()
    }

    async fn analyze(&self, ctx: &Context, request: &Request) -> ProviderResult<Response> {
        self.endpoint.complete(ctx, request).await
    }

    async fn analyze_stream(&self, ctx: &Context, request: &Request) -> ProviderResult<ChunkStream> {
        self.endpoint.stream(ctx, request).await
    }

    async fn validate(&self, ctx: &Context) -> ProviderResult<()> {
        let models = self.list_models(ctx).await?;
        debug!(provider = %self.name(), models = models.len(), "credential accepted");
        Ok(())
    }

    fn metrics(&self) -> Arc<UsageMetrics> {
        self.endpoint.metrics()
    }

    async fn close(&self) -> ProviderResult<()> {
        self.endpoint.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::error::ProviderError;
    use crate::config::SecretString;
    use crate::http::StaticToken;

    fn key(value: &str) -> Arc<dyn TokenSource> {
        Arc::new(StaticToken::new(SecretString::new(value)))
    }

    #[test]
    fn test_invalid_key_rejected_at_construction() {
        let result = OpenAIProvider::new(
            "openai",
            ChatSettings::openai_defaults(),
            key("invalid-key"),
            RateLimits::unlimited(),
            RetryPolicy::no_retry(),
        );
        assert!(matches!(result, Err(ProviderError::AuthenticationFailed { .. })));
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let settings = ChatSettings {
            base_url: "not a url".into(),
            ..ChatSettings::openai_defaults()
        };
        let result = OpenAIProvider::new(
            "openai",
            settings,
            key("sk-test-key"),
            RateLimits::unlimited(),
            RetryPolicy::no_retry(),
        );
        assert!(matches!(result, Err(ProviderError::InvalidConfiguration { .. })));
    }

    #[test]
    fn test_from_config_defaults() {
        let config = ProviderConfig {
            provider_type: "openai".into(),
            auth: crate::config::AuthConfig {
                api_key: Some("sk-test-key".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let provider = OpenAIProvider::from_config(&config).unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.settings().model, "gpt-4o");
        assert_eq!(provider.settings().max_tokens, 4096);
    }

    #[tokio::test]
    async fn test_token_limit_checked_before_sending() {
        let provider = OpenAIProvider::new(
            "openai",
            ChatSettings {
                model: "gpt-4".into(),
                base_url: "http://127.0.0.1:9".into(),
                ..ChatSettings::openai_defaults()
            },
            key("sk-test-key"),
            RateLimits::unlimited(),
            RetryPolicy::no_retry(),
        )
        .unwrap();
        let request = Request::new("q").with_max_tokens(100_000);
        let err = provider.analyze(&Context::new(), &request).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::TokenLimitExceeded {
                requested: 100_000,
                limit: 8_192
            }
        ));
    }

    #[tokio::test]
    async fn test_closed_provider_refuses_work() {
        let provider = OpenAIProvider::new(
            "openai",
            ChatSettings::openai_defaults(),
            key("sk-test-key"),
            RateLimits::unlimited(),
            RetryPolicy::no_retry(),
        )
        .unwrap();
        provider.close().await.unwrap();
        provider.close().await.unwrap();
        let err = provider
            .analyze(&Context::new(), &Request::new("q"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable { .. }));
    }
}
