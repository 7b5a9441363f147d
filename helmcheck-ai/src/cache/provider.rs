//! Cache-aside decorator for any provider

use super::{generate_cache_key, Cache};
use crate::context::Context;
use crate::metrics::UsageMetrics;
use crate::protocol::{Request, Response};
use crate::providers::adapter::{ChunkStream, Provider};
use crate::providers::error::ProviderResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Serves repeated requests from a [`Cache`] before consulting the inner provider
///
/// Streaming, validation and shutdown pass straight through.
pub struct CachedProvider {
    inner: Arc<dyn Provider>,
    cache: Arc<dyn Cache>,
    default_ttl: Duration,
    name: String,
}

impl CachedProvider {
    pub fn new(inner: Arc<dyn Provider>, cache: Arc<dyn Cache>, default_ttl: Duration) -> Self {
        let name = format!("{}-cached", inner.name());
        Self {
            inner,
            cache,
            default_ttl,
            name,
        }
    }

    pub fn inner(&self) -> &Arc<dyn Provider> {
        &self.inner
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }
}

#[async_trait]
impl Provider for CachedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(&self, ctx: &Context, request: &Request) -> ProviderResult<Response> {
        if !request.options.use_cache {
            return self.inner.analyze(ctx, request).await;
        }

        let key = match generate_cache_key(request) {
            Ok(key) => key,
            Err(error) => {
                warn!(provider = %self.inner.name(), error = %error, "cannot key request, skipping cache");
                return self.inner.analyze(ctx, request).await;
            }
        };
        if let Some(mut hit) = self.cache.get(&key) {
            debug!(provider = %self.inner.name(), request_id = %request.id, "serving response from cache");
            self.inner.metrics().record_cache_hit(self.inner.name());
            hit.id = request.id.clone();
            return Ok(hit);
        }

        let response = self.inner.analyze(ctx, request).await?;
        let ttl = request.options.cache_ttl.unwrap_or(self.default_ttl);
        if let Err(error) = self.cache.set(&key, &response, ttl) {
            warn!(provider = %self.inner.name(), error = %error, "failed to cache response");
        }
        Ok(response)
    }

    async fn analyze_stream(&self, ctx: &Context, request: &Request) -> ProviderResult<ChunkStream> {
        self.inner.analyze_stream(ctx, request).await
    }

    async fn validate(&self, ctx: &Context) -> ProviderResult<()> {
        self.inner.validate(ctx).await
    }

    fn metrics(&self) -> Arc<UsageMetrics> {
        self.inner.metrics()
    }

    async fn close(&self) -> ProviderResult<()> {
        self.inner.close().await
    }
}
