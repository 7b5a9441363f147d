//! Usage metrics aggregation tests

use helmcheck_ai::{AnalysisType, TokenUsage, UsageMetrics};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn usage(total: u64, cost: f64) -> TokenUsage {
    TokenUsage {
        prompt_tokens: total / 2,
        completion_tokens: total - total / 2,
        total_tokens: total,
        estimated_cost: cost,
    }
}

#[test]
fn test_empty_metrics() {
    let metrics = UsageMetrics::new();
    assert_eq!(metrics.success_rate(), 0.0);
    assert_eq!(metrics.cache_hit_rate(), 0.0);
    assert_eq!(metrics.total_requests(), 0);
    assert!(metrics.provider_metrics("openai").is_none());
}

#[test]
fn test_per_provider_breakdown() {
    let metrics = UsageMetrics::new();
    metrics.record_success("openai", Duration::from_millis(100), &usage(100, 0.01));
    metrics.record_success("openai", Duration::from_millis(300), &usage(50, 0.02));
    metrics.record_failure("copilot", "timeout");
    metrics.record_cache_hit("openai");
    metrics.record_request_type(AnalysisType::RiskAssessment);

    let openai = metrics.provider_metrics("openai").unwrap();
    assert_eq!(openai.total_requests, 3);
    assert_eq!(openai.cached_requests, 1);
    assert_eq!(openai.tokens_used, 150);
    assert_eq!(openai.average_latency, Duration::from_millis(200));
    assert!((openai.total_cost - 0.03).abs() < 1e-9);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.total_requests, 4);
    assert_eq!(snapshot.failed_requests, 1);
    assert_eq!(snapshot.errors_by_type.get("timeout"), Some(&1));
    assert_eq!(snapshot.requests_by_type.get(&AnalysisType::RiskAssessment), Some(&1));
    assert_eq!(metrics.cache_hit_rate(), 25.0);
    assert_eq!(metrics.success_rate(), 75.0);
}

#[test]
fn test_reset_clears_counters() {
    let metrics = UsageMetrics::new();
    metrics.record_success("openai", Duration::from_millis(10), &usage(10, 0.0));
    metrics.reset();
    assert_eq!(metrics.total_requests(), 0);
    assert!(metrics.snapshot().providers.is_empty());
}

#[test]
fn test_merge_weights_latency() {
    let a = UsageMetrics::new();
    a.record_success("openai", Duration::from_millis(100), &usage(10, 0.0));
    let b = UsageMetrics::new();
    b.record_success("openai", Duration::from_millis(400), &usage(10, 0.0));
    b.record_success("openai", Duration::from_millis(400), &usage(10, 0.0));

    a.merge(&b);
    let merged = a.snapshot();
    assert_eq!(merged.total_requests, 3);
    assert_eq!(merged.average_latency, Duration::from_millis(300));
    assert_eq!(merged.providers["openai"].tokens_used, 30);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_recording() {
    let metrics = Arc::new(UsageMetrics::new());
    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let metrics = metrics.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    if i % 2 == 0 {
                        metrics.record_success("openai", Duration::from_millis(1), &usage(2, 0.0));
                    } else {
                        metrics.record_failure("openai", "unavailable");
                    }
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.total_requests, 800);
    assert_eq!(snapshot.successful_requests, 400);
    assert_eq!(snapshot.tokens_used, 800);
}

proptest! {
    #[test]
    fn prop_success_rate_matches_counts(outcomes in prop::collection::vec(any::<bool>(), 0..200)) {
        let metrics = UsageMetrics::new();
        for ok in &outcomes {
            if *ok {
                metrics.record_success("p", Duration::from_millis(1), &TokenUsage::default());
            } else {
                metrics.record_failure("p", "unavailable");
            }
        }
        let successes = outcomes.iter().filter(|ok| **ok).count() as f64;
        let expected = if outcomes.is_empty() { 0.0 } else { successes / outcomes.len() as f64 * 100.0 };
        prop_assert!((metrics.success_rate() - expected).abs() < 1e-9);
    }
}
