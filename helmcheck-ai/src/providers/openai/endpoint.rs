//! Shared core of the OpenAI-compatible adapters
//!
//! OpenAI and Copilot speak the same chat completion protocol; they differ in
//! defaults, credential format, pricing and how JSON output is requested.

use super::converter::{from_openai_response, to_openai_request, JsonMode};
use super::pricing::context_window;
use super::settings::ChatSettings;
use super::streaming::{spawn_stream, CostFn, StreamMeter};
use super::types::{OpenAIModelList, OpenAIResponse};
use crate::context::Context;
use crate::http::{BearerAuth, HttpClient, TokenFormat, TokenSource, CHAT_COMPLETIONS, MODELS};
use crate::metrics::UsageMetrics;
use crate::protocol::{Request, Response};
use crate::providers::adapter::ChunkStream;
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::guard::CallGuard;
use crate::providers::rate_limit::{RateLimiter, RateLimits};
use crate::providers::retry::RetryPolicy;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;

/// Protocol differences between OpenAI-compatible backends
pub(crate) struct Dialect {
    pub token_format: TokenFormat,
    pub json_mode: JsonMode,
    pub cost: CostFn,
}

pub(crate) struct ChatEndpoint {
    name: String,
    settings: ChatSettings,
    http: HttpClient,
    guard: CallGuard,
    json_mode: JsonMode,
    cost: CostFn,
    closed: AtomicBool,
}

impl ChatEndpoint {
    pub(crate) fn new(
        name: String,
        settings: ChatSettings,
        source: Arc<dyn TokenSource>,
        dialect: Dialect,
        limits: RateLimits,
        retry: RetryPolicy,
    ) -> ProviderResult<Self> {
        source.validate(&name, dialect.token_format)?;
        Url::parse(&settings.base_url).map_err(|e| ProviderError::InvalidConfiguration {
            field: "base_url".to_string(),
            reason: format!("'{}' is not a valid URL: {}", settings.base_url, e),
        })?;

        let auth = BearerAuth::shared(source).with_organization(settings.organization.clone());
        let http = HttpClient::new(&name, &settings.base_url, auth, settings.timeout)?;
        let metrics = Arc::new(UsageMetrics::new());
        let limiter = Arc::new(RateLimiter::new(&name, limits));
        let guard = CallGuard::new(&name, limiter, retry, metrics);

        Ok(Self {
            name,
            settings,
            http,
            guard,
            json_mode: dialect.json_mode,
            cost: dialect.cost,
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub(crate) fn metrics(&self) -> Arc<UsageMetrics> {
        self.guard.metrics().clone()
    }

    fn ensure_open(&self) -> ProviderResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ProviderError::unavailable(&self.name, "provider is closed"));
        }
        Ok(())
    }

    /// Reject requests the backend would refuse anyway
    fn preflight(&self, request: &Request) -> ProviderResult<()> {
        self.ensure_open()?;
        request.validate()?;
        let requested = request.max_tokens.unwrap_or(self.settings.max_tokens) as u64;
        if let Some(limit) = context_window(&self.settings.model) {
            if requested > limit {
                return Err(ProviderError::TokenLimitExceeded { requested, limit });
            }
        }
        self.guard.metrics().record_request_type(request.analysis_type);
        Ok(())
    }

    pub(crate) async fn complete(&self, ctx: &Context, request: &Request) -> ProviderResult<Response> {
        self.preflight(request)?;
        let body = to_openai_request(request, &self.settings, self.json_mode, false);
        debug!(
            provider = %self.name,
            request_id = %request.id,
            model = %body.model,
            analysis_type = %request.analysis_type.as_str(),
            "sending analysis request"
        );

        let name = self.name.as_str();
        let http = &self.http;
        let cost = &self.cost;
        let body = &body;
        let response = self
            .guard
            .call(ctx, &request.options, move || async move {
                let started = Instant::now();
                let reply: OpenAIResponse = http.post_json(CHAT_COMPLETIONS, body).await?;
                from_openai_response(name, request, reply, started.elapsed(), |p, c| cost(p, c))
            })
            .await?;

        info!(
            provider = %self.name,
            request_id = %request.id,
            tokens = response.tokens_used.total_tokens,
            "analysis completed"
        );
        Ok(response)
    }

    pub(crate) async fn stream(&self, ctx: &Context, request: &Request) -> ProviderResult<ChunkStream> {
        self.preflight(request)?;
        let body = to_openai_request(request, &self.settings, self.json_mode, true);
        debug!(provider = %self.name, request_id = %request.id, "opening analysis stream");

        let http = &self.http;
        let body = &body;
        let started = Instant::now();
        let opened: reqwest::Response = self
            .guard
            .call(ctx, &request.options, move || async move {
                http.post_stream(CHAT_COMPLETIONS, body).await
            })
            .await?;

        let meter = StreamMeter {
            provider: self.name.clone(),
            metrics: self.guard.metrics().clone(),
            limiter: self.guard.limiter().clone(),
            cost: self.cost.clone(),
            started,
        };
        let stream_ctx = match request.options.timeout {
            Some(timeout) => ctx.child_with_timeout(timeout),
            None => ctx.child(),
        };
        Ok(spawn_stream(stream_ctx, opened, meter))
    }

    pub(crate) async fn list_models(&self, ctx: &Context) -> ProviderResult<OpenAIModelList> {
        self.ensure_open()?;
        ctx.run(self.http.get_json(MODELS)).await
    }

    /// Mark closed; returns false when already closed
    pub(crate) fn close(&self) -> bool {
        let was_open = !self.closed.swap(true, Ordering::AcqRel);
        if was_open {
            info!(provider = %self.name, "provider closed");
        }
        was_open
    }
}
