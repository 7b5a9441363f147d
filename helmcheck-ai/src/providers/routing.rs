//! Ordered fallback across providers
//!
//! A [`ProviderChain`] tries its members in priority order and returns the
//! first success. It implements [`Provider`] itself, so a chain can be cached,
//! nested or handed to callers that only know the trait.

use crate::cache::{Cache, CachedProvider, CleanupHandle, MemoryCache};
use crate::config::{AiConfig, ConfigValidator};
use crate::context::Context;
use crate::metrics::UsageMetrics;
use crate::protocol::{Request, Response};
use crate::providers::adapter::{ChunkStream, Provider};
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::registry::ProviderRegistry;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Interval between sweeps of the shared response cache
const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

const CHAIN_NAME: &str = "chain";

/// Primary with fallbacks over any number of providers
pub struct ProviderChain {
    providers: Vec<Arc<dyn Provider>>,
    metrics: Arc<UsageMetrics>,
    cache: Option<Arc<MemoryCache>>,
    _sweeper: Option<CleanupHandle>,
}

impl std::fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderChain")
            .field("providers", &self.provider_names())
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl ProviderChain {
    /// Create a chain trying `providers` in the given order
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        Self {
            providers,
            metrics: Arc::new(UsageMetrics::new()),
            cache: None,
            _sweeper: None,
        }
    }

    pub fn builder() -> ChainBuilder {
        ChainBuilder::new()
    }

    /// Validate `config`, then build every enabled provider in priority order
    ///
    /// When global caching is on, each provider whose own cache setting does
    /// not opt out is wrapped in a [`CachedProvider`] over one shared cache.
    pub fn from_config(config: &AiConfig, registry: &ProviderRegistry) -> ProviderResult<Self> {
        ConfigValidator::new(registry.supported_types()).validate(config)?;

        let shared_cache = config.caching.enabled.then(|| {
            Arc::new(MemoryCache::new(config.caching.max_size_bytes()))
        });

        let mut providers: Vec<Arc<dyn Provider>> = Vec::new();
        for provider_config in config.enabled_providers() {
            let mut effective = provider_config.clone();
            effective.rate_limits = provider_config.rate_limits.inherit(&config.rate_limiting);
            let provider = registry.create(&effective)?;

            let provider = match &shared_cache {
                Some(cache) if provider_config.cache_enabled() => {
                    let ttl = provider_config
                        .cache_ttl()
                        .unwrap_or_else(|| config.caching.ttl_duration());
                    let cache: Arc<dyn Cache> = cache.clone();
                    Arc::new(CachedProvider::new(provider, cache, ttl)) as Arc<dyn Provider>
                }
                _ => provider,
            };
            info!(
                provider = %provider.name(),
                provider_type = %provider_config.provider_type,
                priority = provider_config.priority,
                "provider added to chain"
            );
            providers.push(provider);
        }

        let sweeper = match (&shared_cache, tokio::runtime::Handle::try_current()) {
            (Some(cache), Ok(_)) => Some(cache.spawn_cleanup(CACHE_SWEEP_INTERVAL)),
            _ => None,
        };

        Ok(Self {
            providers,
            metrics: Arc::new(UsageMetrics::new()),
            cache: shared_cache,
            _sweeper: sweeper,
        })
    }

    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Shared response cache built by [`ProviderChain::from_config`]
    pub fn cache(&self) -> Option<&Arc<MemoryCache>> {
        self.cache.as_ref()
    }

    /// Final outcomes recorded by the chain itself, keyed under the chain's name
    pub fn chain_metrics(&self) -> Arc<UsageMetrics> {
        self.metrics.clone()
    }

    fn ensure_members(&self) -> ProviderResult<()> {
        if self.providers.is_empty() {
            return Err(ProviderError::not_configured(
                CHAIN_NAME,
                "no providers in fallback chain",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Provider for ProviderChain {
    fn name(&self) -> &str {
        CHAIN_NAME
    }

    async fn analyze(&self, ctx: &Context, request: &Request) -> ProviderResult<Response> {
        self.ensure_members()?;
        let started = Instant::now();
        let mut errors = Vec::new();

        for (index, provider) in self.providers.iter().enumerate() {
            if let Some(err) = ctx.err() {
                self.metrics.record_failure(CHAIN_NAME, err.kind());
                return Err(err);
            }

            match provider.analyze(ctx, request).await {
                Ok(response) => {
                    if index > 0 {
                        info!(
                            provider = %provider.name(),
                            fallback_index = index,
                            "fallback provider succeeded"
                        );
                    }
                    self.metrics
                        .record_success(CHAIN_NAME, started.elapsed(), &response.tokens_used);
                    return Ok(response);
                }
                Err(error) => {
                    warn!(provider = %provider.name(), error = %error, "provider failed, trying next");
                    errors.push(error);
                }
            }
        }

        let error = ProviderError::AllProvidersFailed { errors };
        self.metrics.record_failure(CHAIN_NAME, error.kind());
        Err(error)
    }

    async fn analyze_stream(&self, ctx: &Context, request: &Request) -> ProviderResult<ChunkStream> {
        self.ensure_members()?;
        let mut errors = Vec::new();

        for provider in &self.providers {
            if let Some(err) = ctx.err() {
                return Err(err);
            }
            match provider.analyze_stream(ctx, request).await {
                Ok(stream) => {
                    debug!(provider = %provider.name(), "stream opened");
                    return Ok(stream);
                }
                Err(error) => {
                    warn!(provider = %provider.name(), error = %error, "stream failed to open, trying next");
                    errors.push(error);
                }
            }
        }

        Err(ProviderError::AllProvidersFailed { errors })
    }

    async fn validate(&self, ctx: &Context) -> ProviderResult<()> {
        self.ensure_members()?;
        let results = join_all(self.providers.iter().map(|p| p.validate(ctx))).await;
        ProviderError::aggregate(results.into_iter().filter_map(Result::err).collect())
    }

    /// Fresh aggregate of every member's metrics
    fn metrics(&self) -> Arc<UsageMetrics> {
        let merged = UsageMetrics::new();
        let mut seen: Vec<Arc<UsageMetrics>> = Vec::new();
        for provider in &self.providers {
            let metrics = provider.metrics();
            if seen.iter().any(|m| Arc::ptr_eq(m, &metrics)) {
                continue;
            }
            merged.merge(&metrics);
            seen.push(metrics);
        }
        Arc::new(merged)
    }

    async fn close(&self) -> ProviderResult<()> {
        let mut errors = Vec::new();
        for provider in &self.providers {
            if let Err(error) = provider.close().await {
                errors.push(error);
            }
        }
        ProviderError::aggregate(errors)
    }
}

/// Builder for fallback chains
#[derive(Default)]
pub struct ChainBuilder {
    providers: Vec<Arc<dyn Provider>>,
    cache: Option<(Arc<dyn Cache>, Duration)>,
}

impl ChainBuilder {
    /// Create a new chain builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider; earlier providers are tried first
    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Wrap every member in a cache-aside decorator over `cache`
    pub fn cache(mut self, cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        self.cache = Some((cache, ttl));
        self
    }

    /// Build the chain
    pub fn build(self) -> ProviderResult<ProviderChain> {
        if self.providers.is_empty() {
            return Err(ProviderError::not_configured(
                CHAIN_NAME,
                "at least one provider is required",
            ));
        }
        let providers = match self.cache {
            Some((cache, ttl)) => self
                .providers
                .into_iter()
                .map(|p| Arc::new(CachedProvider::new(p, cache.clone(), ttl)) as Arc<dyn Provider>)
                .collect(),
            None => self.providers,
        };
        Ok(ProviderChain::new(providers))
    }
}
