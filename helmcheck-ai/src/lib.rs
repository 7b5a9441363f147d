//! helmcheck AI provider layer
//!
//! This crate lets helmcheck ask large-language-model backends to analyze Helm
//! and GitOps deployment state. Callers build a [`Request`], hand it to any
//! [`Provider`] and get back a [`Response`] or a [`ProviderError`].
//!
//! Around the concrete OpenAI and Copilot adapters sit the resilience pieces:
//! a sliding-window [`RateLimiter`], a retry policy with exponential backoff,
//! a bounded LRU+TTL [`MemoryCache`] behind the [`CachedProvider`] decorator,
//! an ordered fallback [`ProviderChain`] and shared [`UsageMetrics`].

pub mod cache;
pub mod config;
pub mod context;
pub mod http;
pub mod metrics;
pub mod protocol;
pub mod providers;

pub use cache::{generate_cache_key, Cache, CacheStats, CachedProvider, MemoryCache};
pub use config::{AiConfig, HelmcheckConfig, ProviderConfig};
pub use context::Context;
pub use metrics::{MetricsSnapshot, ProviderMetrics, UsageMetrics};
pub use protocol::{AnalysisContext, AnalysisType, Request, RequestOptions, Response, ResponseFormat, TokenUsage};
pub use providers::{
    ChunkStream, CopilotProvider, OpenAIProvider, Provider, ProviderChain, ProviderError,
    ProviderRegistry, ProviderResult, RateLimiter, RetryPolicy, StreamChunk,
};

/// Returns the version of the helmcheck-ai library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
