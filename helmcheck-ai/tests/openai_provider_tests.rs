//! OpenAI adapter tests against a mocked chat completion API

mod common;

use common::{drain, init_tracing};
use helmcheck_ai::config::{AuthConfig, ProviderConfig, RetryConfig};
use helmcheck_ai::{
    Context, OpenAIProvider, Provider, ProviderError, Request, RequestOptions, ResponseFormat,
};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "sk-test-key";

fn provider_for(server: &MockServer) -> OpenAIProvider {
    let mut config = ProviderConfig {
        name: "openai-test".to_string(),
        provider_type: "openai".to_string(),
        auth: AuthConfig {
            api_key: Some(API_KEY.into()),
            ..Default::default()
        },
        retry: RetryConfig {
            max_retries: Some(2),
            initial_delay_ms: Some(5),
            max_delay_ms: Some(50),
            ..Default::default()
        },
        ..Default::default()
    };
    config.settings.insert("base_url".to_string(), json!(server.uri()));
    OpenAIProvider::from_config(&config).unwrap()
}

fn completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 120, "completion_tokens": 40, "total_tokens": 160 }
    })
}

fn sse(events: &[&str]) -> ResponseTemplate {
    let body: String = events.iter().map(|e| format!("data: {}\n\n", e)).collect();
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

/// Successful completion maps content, usage and cost
#[tokio::test]
async fn test_analyze_success() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-test-key"))
        .and(body_partial_json(json!({ "model": "gpt-4o", "max_tokens": 4096 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Upgrade ingress-nginx to 4.10.1")))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let request = Request::new("Should we upgrade ingress-nginx?").with_id("req-42");
    let response = provider.analyze(&Context::new(), &request).await.unwrap();

    assert_eq!(response.id, "req-42");
    assert_eq!(response.content, "Upgrade ingress-nginx to 4.10.1");
    assert_eq!(response.provider, "openai-test");
    assert_eq!(response.tokens_used.total_tokens, 160);
    assert!(response.tokens_used.estimated_cost > 0.0);
    assert_eq!(response.metadata.get("finish_reason").map(String::as_str), Some("stop"));
    assert!(!response.cached);

    let metrics = provider.metrics().snapshot();
    assert_eq!(metrics.successful_requests, 1);
    assert_eq!(metrics.tokens_used, 160);
}

#[tokio::test]
async fn test_json_format_uses_native_mode() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({ "response_format": { "type": "json_object" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"risk":"low","confidence":0.85,"steps":["bump chart version"]}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let request = Request::new("Assess the upgrade risk").with_options(RequestOptions {
        response_format: ResponseFormat::Json,
        ..Default::default()
    });
    let response = provider.analyze(&Context::new(), &request).await.unwrap();

    let data = response.structured_data.expect("structured data");
    assert_eq!(data["risk"], "low");
    assert!((response.confidence - 0.85).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": { "message": "overloaded", "type": "server_error" }
        })))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("third time lucky")))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let response = provider
        .analyze(&Context::new(), &Request::new("retry me"))
        .await
        .unwrap();

    assert_eq!(response.content, "third time lucky");
    let metrics = provider.metrics().snapshot();
    assert_eq!(metrics.successful_requests, 1);
    assert_eq!(metrics.failed_requests, 0);
}

#[tokio::test]
async fn test_bad_request_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "message": "Invalid 'messages'", "type": "invalid_request_error" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let error = provider
        .analyze(&Context::new(), &Request::new("bad"))
        .await
        .unwrap_err();

    match error {
        ProviderError::InvalidRequest(message) => assert!(message.contains("Invalid 'messages'")),
        other => panic!("expected InvalidRequest, got {other:?}"),
    }
    assert_eq!(provider.metrics().snapshot().errors_by_type.get("invalid_request"), Some(&1));
}

#[tokio::test]
async fn test_unauthorized_maps_to_authentication_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "Incorrect API key provided", "type": "invalid_request_error" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let error = provider
        .analyze(&Context::new(), &Request::new("who am i"))
        .await
        .unwrap_err();
    assert!(matches!(error, ProviderError::AuthenticationFailed { .. }));
}

#[tokio::test]
async fn test_rate_limited_until_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "0")
                .set_body_json(json!({
                    "error": { "message": "Rate limit reached", "type": "requests" }
                })),
        )
        .expect(3)
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let error = provider
        .analyze(&Context::new(), &Request::new("busy"))
        .await
        .unwrap_err();

    match error {
        ProviderError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, ProviderError::RateLimitExceeded { .. }));
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_insufficient_quota_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "message": "You exceeded your current quota", "type": "insufficient_quota" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let error = provider
        .analyze(&Context::new(), &Request::new("quota"))
        .await
        .unwrap_err();
    assert!(matches!(error, ProviderError::QuotaExceeded { .. }));
}

#[tokio::test]
async fn test_request_timeout_option() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(5))
                .set_body_json(completion("too late")),
        )
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let request = Request::new("hurry").with_options(RequestOptions {
        timeout: Some(Duration::from_millis(200)),
        retry_count: Some(0),
        ..Default::default()
    });
    let error = provider.analyze(&Context::new(), &request).await.unwrap_err();
    assert!(matches!(error, ProviderError::Timeout(_)));
}

#[tokio::test]
async fn test_token_limit_checked_before_sending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("unreachable")))
        .expect(0)
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let request = Request::new("huge").with_max_tokens(1_000_000);
    let error = provider.analyze(&Context::new(), &request).await.unwrap_err();
    assert!(matches!(error, ProviderError::TokenLimitExceeded { .. }));
}

/// Streamed deltas arrive in order, followed by one done chunk
#[tokio::test]
async fn test_stream_delivers_chunks_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({ "stream": true, "stream_options": { "include_usage": true } })))
        .respond_with(sse(&[
            r#"{"id":"c1","model":"gpt-4o","choices":[{"index":0,"delta":{"role":"assistant","content":"Upgrade"},"finish_reason":null}]}"#,
            r#"{"id":"c1","model":"gpt-4o","choices":[{"index":0,"delta":{"content":" is safe"},"finish_reason":null}]}"#,
            r#"{"id":"c1","model":"gpt-4o","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
            r#"{"id":"c1","model":"gpt-4o","choices":[],"usage":{"prompt_tokens":12,"completion_tokens":3,"total_tokens":15}}"#,
            "[DONE]",
        ]))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let stream = provider
        .analyze_stream(&Context::new(), &Request::new("stream the verdict"))
        .await
        .unwrap();
    let chunks = drain(stream).await;

    let text: String = chunks.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(text, "Upgrade is safe");
    let last = chunks.last().unwrap();
    assert!(last.done);
    assert!(last.error.is_none());

    let metrics = provider.metrics().snapshot();
    assert_eq!(metrics.successful_requests, 1);
    assert_eq!(metrics.tokens_used, 15);
}

#[tokio::test]
async fn test_truncated_stream_ends_with_error_chunk() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(sse(&[
            r#"{"choices":[{"index":0,"delta":{"content":"partial"},"finish_reason":null}]}"#,
        ]))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let stream = provider
        .analyze_stream(&Context::new(), &Request::new("cut off"))
        .await
        .unwrap();
    let chunks = drain(stream).await;

    assert_eq!(chunks[0].content, "partial");
    let last = chunks.last().unwrap();
    assert!(matches!(last.error, Some(ProviderError::InvalidResponse { .. })));
    assert_eq!(provider.metrics().snapshot().failed_requests, 1);
}

#[tokio::test]
async fn test_validate_lists_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [
                { "id": "gpt-4o", "object": "model", "owned_by": "openai" },
                { "id": "gpt-4-turbo", "object": "model", "owned_by": "openai" }
            ]
        })))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    tokio_test::assert_ok!(provider.validate(&Context::new()).await);
    let models = provider.list_models(&Context::new()).await.unwrap();
    assert_eq!(models, vec!["gpt-4o", "gpt-4-turbo"]);
}

#[tokio::test]
async fn test_closed_provider_refuses_calls() {
    let server = MockServer::start().await;
    let provider = provider_for(&server);

    provider.close().await.unwrap();
    provider.close().await.unwrap();

    let error = provider
        .analyze(&Context::new(), &Request::new("anyone there?"))
        .await
        .unwrap_err();
    assert!(matches!(error, ProviderError::Unavailable { .. }));
}
