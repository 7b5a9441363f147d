//! Resilience wrapper shared by the backend adapters
//!
//! Every outbound call goes through [`CallGuard::call`]: the request timeout
//! scopes the context, the retry executor drives attempts, and each attempt
//! takes a rate-limit permit before any network I/O happens.

use crate::context::Context;
use crate::metrics::UsageMetrics;
use crate::protocol::{RequestOptions, Response, TokenUsage};
use crate::providers::error::ProviderResult;
use crate::providers::rate_limit::RateLimiter;
use crate::providers::retry::{RetryExecutor, RetryPolicy};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

/// Results whose token usage should be recorded once the call succeeds
pub trait Metered {
    fn usage(&self) -> Option<&TokenUsage>;
}

impl Metered for Response {
    fn usage(&self) -> Option<&TokenUsage> {
        Some(&self.tokens_used)
    }
}

/// Stream bodies are metered by the task that drains them.
impl Metered for reqwest::Response {
    fn usage(&self) -> Option<&TokenUsage> {
        None
    }
}

impl Metered for () {
    fn usage(&self) -> Option<&TokenUsage> {
        None
    }
}

/// Rate limiting, retries and metrics around one provider's calls
#[derive(Debug, Clone)]
pub struct CallGuard {
    provider: String,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    metrics: Arc<UsageMetrics>,
}

impl CallGuard {
    pub fn new(
        provider: impl Into<String>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        metrics: Arc<UsageMetrics>,
    ) -> Self {
        Self {
            provider: provider.into(),
            limiter,
            retry,
            metrics,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn metrics(&self) -> &Arc<UsageMetrics> {
        &self.metrics
    }

    /// Run `attempt` under the provider's limits and retry policy
    pub async fn call<T, F, Fut>(
        &self,
        ctx: &Context,
        options: &RequestOptions,
        mut attempt: F,
    ) -> ProviderResult<T>
    where
        T: Metered,
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let scoped = match options.timeout {
            Some(timeout) => ctx.child_with_timeout(timeout),
            None => ctx.child(),
        };
        let executor = RetryExecutor::new(self.retry.with_overrides(options));
        let started = Instant::now();

        let scoped = &scoped;
        let limiter = &self.limiter;
        let result = executor
            .execute(scoped, move |n| {
                let fut = attempt();
                async move {
                    let _permit = limiter.acquire(scoped).await?;
                    if n > 0 {
                        debug!(attempt = n + 1, "issuing retry attempt");
                    }
                    scoped.run(fut).await
                }
            })
            .await;

        match &result {
            Ok(value) => {
                if let Some(usage) = value.usage() {
                    self.limiter.record_tokens(usage.total_tokens);
                    self.metrics
                        .record_success(&self.provider, started.elapsed(), usage);
                }
            }
            Err(error) => self.metrics.record_failure(&self.provider, error.kind()),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::error::ProviderError;
    use crate::providers::rate_limit::RateLimits;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn guard(policy: RetryPolicy) -> CallGuard {
        CallGuard::new(
            "mock",
            Arc::new(RateLimiter::new("mock", RateLimits::unlimited())),
            policy,
            Arc::new(UsageMetrics::new()),
        )
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay_ms: 10,
            max_delay_ms: 100,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_records_usage() {
        let guard = guard(fast_policy(0));
        let response = guard
            .call(&Context::new(), &RequestOptions::default(), || async {
                Ok(Response {
                    tokens_used: TokenUsage {
                        total_tokens: 42,
                        ..Default::default()
                    },
                    ..Default::default()
                })
            })
            .await
            .unwrap();
        assert_eq!(response.tokens_used.total_tokens, 42);

        let stats = guard.metrics().provider_metrics("mock").unwrap();
        assert_eq!(stats.successful_requests, 1);
        assert_eq!(stats.tokens_used, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_recorded_once_per_call() {
        let guard = guard(fast_policy(2));
        let calls = AtomicU32::new(0);
        let result: ProviderResult<Response> = guard
            .call(&Context::new(), &RequestOptions::default(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::unavailable("mock", "down")) }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::RetriesExhausted { attempts: 3, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let stats = guard.metrics().provider_metrics("mock").unwrap();
        assert_eq!(stats.failed_requests, 1);
        assert_eq!(stats.total_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_bounds_attempt() {
        let guard = guard(fast_policy(0));
        let options = RequestOptions {
            timeout: Some(Duration::from_millis(100)),
            ..Default::default()
        };
        let result: ProviderResult<Response> = guard
            .call(&Context::new(), &options, || async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(Response::default())
            })
            .await;
        assert!(matches!(result, Err(ProviderError::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_retry_override() {
        let guard = guard(fast_policy(5));
        let calls = AtomicU32::new(0);
        let options = RequestOptions {
            retry_count: Some(1),
            ..Default::default()
        };
        let _: ProviderResult<Response> = guard
            .call(&Context::new(), &options, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::Timeout("slow".into())) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
