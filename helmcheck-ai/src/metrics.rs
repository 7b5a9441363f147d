//! Usage metrics aggregation
//!
//! [`UsageMetrics`] keeps one aggregate record plus one record per provider
//! name. Every completed attempt is recorded, success or failure. Readers get
//! point-in-time copies through [`UsageMetrics::snapshot`].

use crate::protocol::{AnalysisType, TokenUsage};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Counters for a single provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetrics {
    pub name: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub cached_requests: u64,
    pub tokens_used: u64,
    pub total_cost: f64,
    pub average_latency: Duration,
    pub last_used: Option<DateTime<Utc>>,
}

impl ProviderMetrics {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn fold_latency(&mut self, latency: Duration) {
        self.average_latency = running_average(self.average_latency, self.latency_samples(), latency);
    }

    pub fn success_rate(&self) -> f64 {
        percentage(self.successful_requests, self.total_requests)
    }

    /// Successes that went over the network; cache hits carry no latency
    fn latency_samples(&self) -> u64 {
        self.successful_requests.saturating_sub(self.cached_requests)
    }
}

/// `(old * n + latest) / (n + 1)` where `n` counts samples before `latest`
fn running_average(old: Duration, n: u64, latest: Duration) -> Duration {
    if n == 0 {
        return latest;
    }
    let n = n as u128;
    nanos_to_duration((old.as_nanos() * n + latest.as_nanos()) / (n + 1))
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

#[derive(Debug, Default)]
struct MetricsState {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    cached_requests: u64,
    tokens_used: u64,
    total_cost: f64,
    average_latency: Duration,
    providers: BTreeMap<String, ProviderMetrics>,
    requests_by_type: BTreeMap<AnalysisType, u64>,
    errors_by_type: BTreeMap<String, u64>,
    last_request_time: Option<DateTime<Utc>>,
}

impl MetricsState {
    fn provider(&mut self, name: &str) -> &mut ProviderMetrics {
        self.providers
            .entry(name.to_string())
            .or_insert_with(|| ProviderMetrics::named(name))
    }
}

/// Point-in-time copy of a [`UsageMetrics`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub cached_requests: u64,
    pub tokens_used: u64,
    pub total_cost: f64,
    pub average_latency: Duration,
    pub success_rate: f64,
    pub cache_hit_rate: f64,
    pub providers: BTreeMap<String, ProviderMetrics>,
    pub requests_by_type: BTreeMap<AnalysisType, u64>,
    pub errors_by_type: BTreeMap<String, u64>,
    pub uptime: Duration,
    pub last_request_time: Option<DateTime<Utc>>,
}

/// Concurrency-safe usage counters
#[derive(Debug)]
pub struct UsageMetrics {
    state: RwLock<MetricsState>,
    started: RwLock<Instant>,
}

impl Default for UsageMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageMetrics {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MetricsState::default()),
            started: RwLock::new(Instant::now()),
        }
    }

    /// Record a successful attempt
    pub fn record_success(&self, provider: &str, latency: Duration, usage: &TokenUsage) {
        let now = Utc::now();
        let mut state = self.state.write();

        let samples = state.successful_requests.saturating_sub(state.cached_requests);
        state.average_latency = running_average(state.average_latency, samples, latency);
        state.total_requests += 1;
        state.successful_requests += 1;
        state.tokens_used += usage.total_tokens;
        state.total_cost += usage.estimated_cost;
        state.last_request_time = Some(now);

        let record = state.provider(provider);
        record.fold_latency(latency);
        record.total_requests += 1;
        record.successful_requests += 1;
        record.tokens_used += usage.total_tokens;
        record.total_cost += usage.estimated_cost;
        record.last_used = Some(now);
    }

    /// Record a failed attempt under the given error classification
    pub fn record_failure(&self, provider: &str, error_kind: &str) {
        let now = Utc::now();
        let mut state = self.state.write();

        state.total_requests += 1;
        state.failed_requests += 1;
        state.last_request_time = Some(now);
        *state.errors_by_type.entry(error_kind.to_string()).or_insert(0) += 1;

        let record = state.provider(provider);
        record.total_requests += 1;
        record.failed_requests += 1;
        record.last_used = Some(now);
    }

    /// Record a request served from cache
    ///
    /// Cache hits count as successful requests so the hit rate never exceeds 100%.
    pub fn record_cache_hit(&self, provider: &str) {
        let now = Utc::now();
        let mut state = self.state.write();

        state.total_requests += 1;
        state.successful_requests += 1;
        state.cached_requests += 1;
        state.last_request_time = Some(now);

        let record = state.provider(provider);
        record.total_requests += 1;
        record.successful_requests += 1;
        record.cached_requests += 1;
        record.last_used = Some(now);
    }

    pub fn record_request_type(&self, analysis_type: AnalysisType) {
        *self
            .state
            .write()
            .requests_by_type
            .entry(analysis_type)
            .or_insert(0) += 1;
    }

    /// Successful requests as a percentage of all requests, 0 when empty
    pub fn success_rate(&self) -> f64 {
        let state = self.state.read();
        percentage(state.successful_requests, state.total_requests)
    }

    /// Cached requests as a percentage of all requests, 0 when empty
    pub fn cache_hit_rate(&self) -> f64 {
        let state = self.state.read();
        percentage(state.cached_requests, state.total_requests)
    }

    pub fn total_requests(&self) -> u64 {
        self.state.read().total_requests
    }

    pub fn provider_metrics(&self, provider: &str) -> Option<ProviderMetrics> {
        self.state.read().providers.get(provider).cloned()
    }

    /// Fold another metrics instance into this one
    ///
    /// Average latencies are combined weighted by successful request counts.
    pub fn merge(&self, other: &UsageMetrics) {
        if std::ptr::eq(self, other) {
            return;
        }
        let theirs = other.snapshot();
        let mut state = self.state.write();

        state.average_latency = weighted_latency(
            state.average_latency,
            state.successful_requests.saturating_sub(state.cached_requests),
            theirs.average_latency,
            theirs.successful_requests.saturating_sub(theirs.cached_requests),
        );
        state.total_requests += theirs.total_requests;
        state.successful_requests += theirs.successful_requests;
        state.failed_requests += theirs.failed_requests;
        state.cached_requests += theirs.cached_requests;
        state.tokens_used += theirs.tokens_used;
        state.total_cost += theirs.total_cost;
        state.last_request_time = state.last_request_time.max(theirs.last_request_time);

        for (name, incoming) in theirs.providers {
            let record = state.provider(&name);
            record.average_latency = weighted_latency(
                record.average_latency,
                record.latency_samples(),
                incoming.average_latency,
                incoming.latency_samples(),
            );
            record.total_requests += incoming.total_requests;
            record.successful_requests += incoming.successful_requests;
            record.failed_requests += incoming.failed_requests;
            record.cached_requests += incoming.cached_requests;
            record.tokens_used += incoming.tokens_used;
            record.total_cost += incoming.total_cost;
            record.last_used = record.last_used.max(incoming.last_used);
        }
        for (analysis_type, count) in theirs.requests_by_type {
            *state.requests_by_type.entry(analysis_type).or_insert(0) += count;
        }
        for (kind, count) in theirs.errors_by_type {
            *state.errors_by_type.entry(kind).or_insert(0) += count;
        }
    }

    /// Zero every counter and restart the uptime clock
    pub fn reset(&self) {
        *self.state.write() = MetricsState::default();
        *self.started.write() = Instant::now();
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime = self.started.read().elapsed();
        let state = self.state.read();
        MetricsSnapshot {
            total_requests: state.total_requests,
            successful_requests: state.successful_requests,
            failed_requests: state.failed_requests,
            cached_requests: state.cached_requests,
            tokens_used: state.tokens_used,
            total_cost: state.total_cost,
            average_latency: state.average_latency,
            success_rate: percentage(state.successful_requests, state.total_requests),
            cache_hit_rate: percentage(state.cached_requests, state.total_requests),
            providers: state.providers.clone(),
            requests_by_type: state.requests_by_type.clone(),
            errors_by_type: state.errors_by_type.clone(),
            uptime,
            last_request_time: state.last_request_time,
        }
    }
}

fn weighted_latency(a: Duration, a_count: u64, b: Duration, b_count: u64) -> Duration {
    let total = a_count + b_count;
    if total == 0 {
        return Duration::ZERO;
    }
    let weighted = a.as_nanos() * a_count as u128 + b.as_nanos() * b_count as u128;
    nanos_to_duration(weighted / total as u128)
}

fn nanos_to_duration(nanos: u128) -> Duration {
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(tokens: u64, cost: f64) -> TokenUsage {
        TokenUsage {
            prompt_tokens: tokens / 2,
            completion_tokens: tokens - tokens / 2,
            total_tokens: tokens,
            estimated_cost: cost,
        }
    }

    #[test]
    fn test_empty_rates_are_zero() {
        let metrics = UsageMetrics::new();
        assert_eq!(metrics.success_rate(), 0.0);
        assert_eq!(metrics.cache_hit_rate(), 0.0);
    }

    #[test]
    fn test_running_average_latency() {
        let metrics = UsageMetrics::new();
        metrics.record_success("openai", Duration::from_millis(100), &usage(10, 0.1));
        metrics.record_success("openai", Duration::from_millis(300), &usage(10, 0.1));
        metrics.record_success("openai", Duration::from_millis(200), &usage(10, 0.1));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.average_latency.as_millis(), 200);
        assert_eq!(snapshot.tokens_used, 30);
        let record = metrics.provider_metrics("openai").unwrap();
        assert_eq!(record.average_latency.as_millis(), 200);
    }

    #[test]
    fn test_failures_do_not_skew_latency() {
        let metrics = UsageMetrics::new();
        metrics.record_failure("openai", "timeout");
        metrics.record_success("openai", Duration::from_millis(80), &usage(1, 0.0));
        assert_eq!(metrics.snapshot().average_latency.as_millis(), 80);
    }

    #[test]
    fn test_error_histogram() {
        let metrics = UsageMetrics::new();
        metrics.record_failure("openai", "timeout");
        metrics.record_failure("copilot", "timeout");
        metrics.record_failure("copilot", "authentication");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.errors_by_type["timeout"], 2);
        assert_eq!(snapshot.errors_by_type["authentication"], 1);
        assert_eq!(snapshot.providers["copilot"].failed_requests, 2);
    }

    #[test]
    fn test_cache_hits_bounded_rate() {
        let metrics = UsageMetrics::new();
        metrics.record_cache_hit("openai");
        metrics.record_cache_hit("openai");
        metrics.record_success("openai", Duration::from_millis(5), &usage(2, 0.0));
        assert!((metrics.cache_hit_rate() - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(metrics.success_rate(), 100.0);
        assert_eq!(metrics.snapshot().average_latency.as_millis(), 5);
    }

    #[test]
    fn test_merge_weights_latency() {
        let a = UsageMetrics::new();
        a.record_success("openai", Duration::from_millis(100), &usage(10, 1.0));
        let b = UsageMetrics::new();
        b.record_success("copilot", Duration::from_millis(400), &usage(20, 2.0));
        b.record_success("copilot", Duration::from_millis(400), &usage(20, 2.0));
        b.record_request_type(AnalysisType::Strategy);

        let merged = UsageMetrics::new();
        merged.merge(&a);
        merged.merge(&b);

        let snapshot = merged.snapshot();
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.tokens_used, 50);
        assert_eq!(snapshot.average_latency.as_millis(), 300);
        assert_eq!(snapshot.requests_by_type[&AnalysisType::Strategy], 1);
        assert_eq!(snapshot.providers.len(), 2);
    }

    #[test]
    fn test_reset() {
        let metrics = UsageMetrics::new();
        metrics.record_failure("openai", "timeout");
        metrics.reset();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 0);
        assert!(snapshot.errors_by_type.is_empty());
        assert!(snapshot.last_request_time.is_none());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let metrics = UsageMetrics::new();
        metrics.record_failure("openai", "timeout");
        let before = metrics.snapshot();
        metrics.record_failure("openai", "timeout");
        assert_eq!(before.total_requests, 1);
        assert_eq!(metrics.total_requests(), 2);
    }
}
