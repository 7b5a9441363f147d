//! Retry policy for resilient provider operations
//!
//! This module implements configurable retry policies with exponential backoff,
//! optional jitter, server-supplied retry-after hints and pattern-based
//! classification of otherwise opaque errors.

use crate::config::RetryConfig;
use crate::context::Context;
use crate::protocol::RequestOptions;
use crate::providers::error::{ProviderError, ProviderResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (not including the initial attempt)
    pub max_retries: u32,

    /// Initial delay before first retry (milliseconds)
    pub initial_delay_ms: u64,

    /// Maximum delay between retries (milliseconds)
    pub max_delay_ms: u64,

    /// Base for exponential backoff (e.g., 2.0 for doubling)
    pub exponential_base: f64,

    /// Jitter factor (0.0 to 1.0) to randomize delays
    pub jitter_factor: f64,

    /// Whether to respect retry-after hints carried by errors
    pub respect_retry_after: bool,

    /// Extra substrings marking an error message as transient
    pub retryable_patterns: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            exponential_base: 2.0,
            jitter_factor: 0.0,
            respect_retry_after: true,
            retryable_patterns: Vec::new(),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        let defaults = Self::default();
        Self {
            max_retries: config
                .max_retries
                .map(|n| n.clamp(0, u32::MAX as i64) as u32)
                .unwrap_or(defaults.max_retries),
            initial_delay_ms: config
                .initial_delay_ms
                .map(|n| n.max(0) as u64)
                .unwrap_or(defaults.initial_delay_ms),
            max_delay_ms: config
                .max_delay_ms
                .map(|n| n.max(0) as u64)
                .unwrap_or(defaults.max_delay_ms),
            exponential_base: config.multiplier.unwrap_or(defaults.exponential_base),
            jitter_factor: defaults.jitter_factor,
            respect_retry_after: defaults.respect_retry_after,
            retryable_patterns: config.retryable_errors.clone(),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with custom configuration
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Create a policy with no retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    /// Apply per-request retry count and initial delay
    pub fn with_overrides(&self, options: &RequestOptions) -> Self {
        let mut policy = self.clone();
        if let Some(count) = options.retry_count {
            policy.max_retries = count;
        }
        if let Some(delay) = options.retry_delay {
            policy.initial_delay_ms = delay.as_millis().min(u64::MAX as u128) as u64;
        }
        policy
    }

    /// Calculate the delay for a given retry attempt (zero-based)
    pub fn calculate_delay(&self, attempt: u32, error: &ProviderError) -> Duration {
        let max_delay = Duration::from_millis(self.max_delay_ms);

        if self.respect_retry_after {
            if let Some(retry_after) = error.retry_after() {
                return retry_after.min(max_delay);
            }
        }

        let base_delay = self.initial_delay_ms as f64 * self.exponential_base.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let delay_with_jitter = if self.jitter_factor > 0.0 {
            let jitter_range = capped_delay * self.jitter_factor;
            let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped_delay + jitter).clamp(0.0, self.max_delay_ms as f64)
        } else {
            capped_delay
        };

        Duration::from_millis(delay_with_jitter as u64)
    }

    /// Whether an error is worth another attempt, regardless of attempt count
    pub fn is_retryable(&self, error: &ProviderError) -> bool {
        if error.is_permanent() {
            return false;
        }
        if error.is_retryable() {
            return true;
        }
        if self.retryable_patterns.is_empty() {
            return false;
        }
        let message = error.to_string().to_lowercase();
        self.retryable_patterns
            .iter()
            .any(|pattern| message.contains(&pattern.to_lowercase()))
    }

    /// Check if we should retry based on the error and attempt count
    pub fn should_retry(&self, error: &ProviderError, attempt: u32) -> bool {
        attempt < self.max_retries && self.is_retryable(error)
    }
}

/// Executor for retry operations
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create a new retry executor with the given policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute an operation with retry logic
    ///
    /// `operation` receives the zero-based attempt number. Backoff sleeps end
    /// early when `ctx` is cancelled or expires.
    pub async fn execute<F, T, Fut>(&self, ctx: &Context, mut operation: F) -> ProviderResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let mut attempt = 0;

        loop {
            if let Some(err) = ctx.err() {
                return Err(err);
            }

            let error = match operation(attempt).await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(attempts = attempt + 1, "operation succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            if !self.policy.is_retryable(&error) {
                return Err(error);
            }
            if attempt >= self.policy.max_retries {
                if self.policy.max_retries == 0 {
                    return Err(error);
                }
                return Err(ProviderError::RetriesExhausted {
                    attempts: attempt + 1,
                    last: Box::new(error),
                });
            }

            let delay = self.policy.calculate_delay(attempt, &error);
            warn!(
                attempt = attempt + 1,
                max_retries = self.policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying after transient failure"
            );
            ctx.sleep(delay).await?;
            attempt += 1;
        }
    }
}
