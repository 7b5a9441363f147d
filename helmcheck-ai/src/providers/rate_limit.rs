//! Request admission control
//!
//! Sliding-window limits on requests per minute, requests per hour and tokens
//! per minute, plus an optional cap on in-flight calls. A limit of zero means
//! unlimited.

use crate::config::RateLimitConfig;
use crate::context::Context;
use crate::providers::error::{ProviderError, ProviderResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::debug;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Resolved limits for one provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimits {
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
    pub tokens_per_minute: u64,
    pub max_concurrent: u32,
}

impl RateLimits {
    /// No limit of any kind
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn per_minute(requests: u32) -> Self {
        Self {
            requests_per_minute: requests,
            ..Default::default()
        }
    }

    /// Provider limits, falling back to the global ones where the provider leaves a field unset
    pub fn resolve(provider: &RateLimitConfig, global: &RateLimitConfig) -> Self {
        fn pick(own: Option<i64>, fallback: Option<i64>) -> i64 {
            own.or(fallback).unwrap_or(0).max(0)
        }
        Self {
            requests_per_minute: pick(provider.requests_per_minute, global.requests_per_minute)
                .min(u32::MAX as i64) as u32,
            requests_per_hour: pick(provider.requests_per_hour, global.requests_per_hour)
                .min(u32::MAX as i64) as u32,
            tokens_per_minute: pick(provider.tokens_per_minute, global.tokens_per_minute) as u64,
            max_concurrent: pick(provider.max_concurrent, global.max_concurrent)
                .min(u32::MAX as i64) as u32,
        }
    }
}

#[derive(Debug, Default)]
struct Windows {
    minute: VecDeque<Instant>,
    hour: VecDeque<Instant>,
    tokens: VecDeque<(Instant, u64)>,
    tokens_in_window: u64,
}

impl Windows {
    fn prune(&mut self, now: Instant) {
        while matches!(self.minute.front(), Some(t) if now.duration_since(*t) >= MINUTE) {
            self.minute.pop_front();
        }
        while matches!(self.hour.front(), Some(t) if now.duration_since(*t) >= HOUR) {
            self.hour.pop_front();
        }
        while let Some(&(t, tokens)) = self.tokens.front() {
            if now.duration_since(t) < MINUTE {
                break;
            }
            self.tokens_in_window -= tokens;
            self.tokens.pop_front();
        }
    }

    /// Admit now, or report how long until a slot frees up
    fn try_admit(&mut self, limits: &RateLimits, now: Instant) -> Result<(), Duration> {
        self.prune(now);
        let mut wait = Duration::ZERO;

        if limits.requests_per_minute > 0 && self.minute.len() >= limits.requests_per_minute as usize {
            if let Some(oldest) = self.minute.front() {
                wait = wait.max(MINUTE - now.duration_since(*oldest));
            }
        }
        if limits.requests_per_hour > 0 && self.hour.len() >= limits.requests_per_hour as usize {
            if let Some(oldest) = self.hour.front() {
                wait = wait.max(HOUR - now.duration_since(*oldest));
            }
        }
        if limits.tokens_per_minute > 0 && self.tokens_in_window >= limits.tokens_per_minute {
            if let Some((oldest, _)) = self.tokens.front() {
                wait = wait.max(MINUTE - now.duration_since(*oldest));
            }
        }

        if !wait.is_zero() {
            return Err(wait);
        }
        if limits.requests_per_minute > 0 {
            self.minute.push_back(now);
        }
        if limits.requests_per_hour > 0 {
            self.hour.push_back(now);
        }
        Ok(())
    }
}

/// Held for the duration of one admitted call
#[derive(Debug)]
pub struct RatePermit {
    _concurrency: Option<OwnedSemaphorePermit>,
}

/// Per-provider admission gate
#[derive(Debug)]
pub struct RateLimiter {
    provider: String,
    limits: RateLimits,
    windows: Mutex<Windows>,
    concurrency: Option<Arc<Semaphore>>,
}

impl RateLimiter {
    pub fn new(provider: impl Into<String>, limits: RateLimits) -> Self {
        let concurrency = (limits.max_concurrent > 0)
            .then(|| Arc::new(Semaphore::new(limits.max_concurrent as usize)));
        Self {
            provider: provider.into(),
            limits,
            windows: Mutex::new(Windows::default()),
            concurrency,
        }
    }

    pub fn limits(&self) -> &RateLimits {
        &self.limits
    }

    /// Wait until the call may proceed, or until `ctx` ends
    pub async fn acquire(&self, ctx: &Context) -> ProviderResult<RatePermit> {
        let concurrency = match &self.concurrency {
            Some(semaphore) => {
                let permit = ctx
                    .run(async {
                        semaphore.clone().acquire_owned().await.map_err(|_| {
                            ProviderError::unavailable(&self.provider, "rate limiter closed")
                        })
                    })
                    .await?;
                Some(permit)
            }
            None => None,
        };

        loop {
            let admitted = self.windows.lock().try_admit(&self.limits, Instant::now());
            match admitted {
                Ok(()) => {
                    return Ok(RatePermit {
                        _concurrency: concurrency,
                    })
                }
                Err(wait) => {
                    debug!(provider = %self.provider, wait_ms = wait.as_millis() as u64, "rate limited, waiting");
                    ctx.sleep(wait).await?;
                }
            }
        }
    }

    /// Admit immediately or fail with the time until a slot frees up
    pub fn try_acquire(&self) -> ProviderResult<RatePermit> {
        let concurrency = match &self.concurrency {
            Some(semaphore) => Some(semaphore.clone().try_acquire_owned().map_err(|_| {
                ProviderError::RateLimitExceeded {
                    provider: self.provider.clone(),
                    limit: format!("{} concurrent requests", self.limits.max_concurrent),
                    retry_after: None,
                }
            })?),
            None => None,
        };

        self.windows
            .lock()
            .try_admit(&self.limits, Instant::now())
            .map(|()| RatePermit {
                _concurrency: concurrency,
            })
            .map_err(|wait| ProviderError::RateLimitExceeded {
                provider: self.provider.clone(),
                limit: self.describe(),
                retry_after: Some(wait),
            })
    }

    /// Charge tokens consumed by a completed call against the per-minute budget
    pub fn record_tokens(&self, tokens: u64) {
        if self.limits.tokens_per_minute == 0 || tokens == 0 {
            return;
        }
        let mut windows = self.windows.lock();
        windows.tokens.push_back((Instant::now(), tokens));
        windows.tokens_in_window += tokens;
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.limits.requests_per_minute > 0 {
            parts.push(format!("{} requests/minute", self.limits.requests_per_minute));
        }
        if self.limits.requests_per_hour > 0 {
            parts.push(format!("{} requests/hour", self.limits.requests_per_hour));
        }
        if self.limits.tokens_per_minute > 0 {
            parts.push(format!("{} tokens/minute", self.limits.tokens_per_minute));
        }
        parts.join(", ")
    }
}
