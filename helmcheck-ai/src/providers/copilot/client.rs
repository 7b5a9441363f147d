//! GitHub Copilot chat client

use crate::config::ProviderConfig;
use crate::context::Context;
use crate::http::{token_source, Credential, TokenFormat, TokenSource};
use crate::metrics::UsageMetrics;
use crate::protocol::{Request, Response};
use crate::providers::adapter::{ChunkStream, Provider};
use crate::providers::error::ProviderResult;
use crate::providers::openai::endpoint::{ChatEndpoint, Dialect};
use crate::providers::openai::{ChatSettings, JsonMode};
use crate::providers::rate_limit::RateLimits;
use crate::providers::retry::RetryPolicy;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Rough Copilot pricing by model family, USD for the whole call
pub fn estimate_cost(prompt_tokens: u64, completion_tokens: u64, model: &str) -> f64 {
    let (prompt_per_1k, completion_per_1k) = if model.contains("gpt-4") {
        (0.03, 0.06)
    } else if model.contains("gpt-3.5") {
        (0.0015, 0.002)
    } else {
        (0.01, 0.02)
    };
    prompt_tokens as f64 / 1000.0 * prompt_per_1k + completion_tokens as f64 / 1000.0 * completion_per_1k
}

/// Copilot provider over the OpenAI-compatible chat endpoint
pub struct CopilotProvider {
    endpoint: ChatEndpoint,
}

impl CopilotProvider {
    pub const DEFAULT_NAME: &'static str = "github-copilot";

    /// Environment variable read when no credential is configured
    pub const TOKEN_ENV: &'static str = "GITHUB_TOKEN";

    pub fn new(
        name: impl Into<String>,
        settings: ChatSettings,
        source: Arc<dyn TokenSource>,
        limits: RateLimits,
        retry: RetryPolicy,
    ) -> ProviderResult<Self> {
        let model = settings.model.clone();
        let dialect = Dialect {
            token_format: TokenFormat::GitHubToken,
            json_mode: JsonMode::PromptOnly,
            cost: Arc::new(move |prompt, completion| estimate_cost(prompt, completion, &model)),
        };
        let endpoint = ChatEndpoint::new(name.into(), settings, source, dialect, limits, retry)?;
        Ok(Self { endpoint })
    }

    pub fn from_config(config: &ProviderConfig) -> ProviderResult<Self> {
        let settings = ChatSettings::copilot_defaults().overlay(config)?;
        let name = if config.name.is_empty() {
            Self::DEFAULT_NAME.to_string()
        } else {
            config.name.clone()
        };
        let source = token_source(&config.auth, Credential::Token, Self::TOKEN_ENV);
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
}

#[async_trait]
impl Provider for CopilotProvider {
    fn name(&self) -> &str {
        self.endpoint.name()
    }

    async fn analyze(&self, ctx: &Context, request: &Request) -> ProviderResult<Response> {
        self.endpoint.complete(ctx, request).await
    }

    async fn analyze_stream(&self, ctx: &Context, request: &Request) -> ProviderResult<ChunkStream> {
        self.endpoint.stream(ctx, request).await
    }

    /// Copilot has no model listing, so a tiny completion stands in
    async fn validate(&self, ctx: &Context) -> ProviderResult<()> {
        let ping = Request::new("ping").with_max_tokens(10);
        let response = self.endpoint.complete(ctx, &ping).await?;
        debug!(provider = %self.name(), tokens = response.tokens_used.total_tokens, "ping succeeded");
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
    use crate::config::AuthConfig;
    use crate::providers::error::ProviderError;

    #[test]
    fn test_cost_by_family() {
        assert!((estimate_cost(1000, 1000, "gpt-4") - 0.09).abs() < 1e-9);
        assert!((estimate_cost(1000, 1000, "gpt-3.5-turbo") - 0.0035).abs() < 1e-9);
        assert!((estimate_cost(1000, 1000, "claude-3.5-sonnet") - 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_from_config_defaults() {
        let config = ProviderConfig {
            provider_type: "copilot".into(),
            auth: AuthConfig {
                token: Some("ghp_testtoken".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let provider = CopilotProvider::from_config(&config).unwrap();
        assert_eq!(provider.name(), "github-copilot");
        assert_eq!(provider.settings().base_url, "https://api.githubcopilot.com");
        assert_eq!(provider.settings().model, "gpt-4");
    }

    #[test]
    fn test_short_token_rejected() {
        let config = ProviderConfig {
            provider_type: "copilot".into(),
            auth: AuthConfig {
                token: Some("abc".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            CopilotProvider::from_config(&config),
            Err(ProviderError::AuthenticationFailed { .. })
        ));
    }
}
