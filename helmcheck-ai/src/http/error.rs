//! HTTP error mapping utilities

use crate::providers::error::ProviderError;
use regex::Regex;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;
use uuid::Uuid;

static MAX_CONTEXT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"maximum context length is (\d+)").ok());
static REQUESTED_TOKENS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?:requested|resulted in) (\d+)").ok());

/// Error details extracted from a response body
#[derive(Debug, Default)]
struct ErrorDetails {
    message: Option<String>,
    error_type: Option<String>,
    code: Option<String>,
    retry_after_seconds: Option<u64>,
}

impl ErrorDetails {
    fn matches(&self, marker: &str) -> bool {
        self.error_type.as_deref() == Some(marker) || self.code.as_deref() == Some(marker)
    }
}

/// Extract error details from common JSON error shapes
fn extract_error_details(body: &str) -> ErrorDetails {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return ErrorDetails::default();
    };
    let str_field = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);

    // { "error": { "message": "...", "type": "...", "code": "..." } }
    if let Some(error) = json.get("error").filter(|e| e.is_object()) {
        return ErrorDetails {
            message: str_field(error, "message"),
            error_type: str_field(error, "type"),
            code: str_field(error, "code"),
            retry_after_seconds: error.get("retry_after").and_then(Value::as_u64),
        };
    }

    // { "message": "...", "error": "..." }
    ErrorDetails {
        message: str_field(&json, "message").or_else(|| str_field(&json, "error")),
        error_type: None,
        code: str_field(&json, "code"),
        retry_after_seconds: json.get("retry_after").and_then(Value::as_u64),
    }
}

fn capture_number(regex: &LazyLock<Option<Regex>>, text: &str) -> Option<u64> {
    regex
        .as_ref()?
        .captures(text)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// Map HTTP status code and response body to a ProviderError
pub fn map_http_error(
    provider: &str,
    status: StatusCode,
    headers: Option<&HeaderMap>,
    body: Option<&str>,
    request_id: Uuid,
) -> ProviderError {
    let details = body.map(extract_error_details).unwrap_or_default();
    let message = details
        .message
        .clone()
        .or_else(|| body.filter(|b| !b.trim().is_empty()).map(str::to_string))
        .unwrap_or_else(|| format!("HTTP error {}", status.as_u16()));
    let message_with_id = format!("{} [request_id: {}]", message, request_id);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::AuthenticationFailed {
            provider: provider.to_string(),
            reason: message_with_id,
        },

        StatusCode::TOO_MANY_REQUESTS if details.matches("insufficient_quota") => {
            ProviderError::QuotaExceeded {
                provider: provider.to_string(),
                reason: message_with_id,
            }
        }

        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = headers
                .and_then(|h| h.get(RETRY_AFTER))
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after)
                .or_else(|| details.retry_after_seconds.map(Duration::from_secs));
            ProviderError::RateLimitExceeded {
                provider: provider.to_string(),
                limit: message_with_id,
                retry_after,
            }
        }

        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
            if details.matches("context_length_exceeded") {
                let limit = capture_number(&MAX_CONTEXT, &message).unwrap_or(0);
                let requested = capture_number(&REQUESTED_TOKENS, &message).unwrap_or(0);
                return ProviderError::TokenLimitExceeded { requested, limit };
            }
            ProviderError::InvalidRequest(message_with_id)
        }

        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            ProviderError::Timeout(message_with_id)
        }

        status if status.is_server_error() => ProviderError::Unavailable {
            provider: provider.to_string(),
            reason: format!("HTTP {}: {}", status.as_u16(), message_with_id),
        },

        status if status.is_client_error() => ProviderError::InvalidRequest(message_with_id),

        _ => ProviderError::InvalidResponse {
            provider: provider.to_string(),
            reason: format!("unexpected HTTP status {}: {}", status.as_u16(), message_with_id),
        },
    }
}

/// Map a transport failure from reqwest to a ProviderError
pub fn map_transport_error(provider: &str, error: &reqwest::Error, request_id: Uuid) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(format!("request to {} timed out [request_id: {}]", provider, request_id))
    } else if error.is_decode() || error.is_body() {
        ProviderError::invalid_response(provider, format!("{} [request_id: {}]", error, request_id))
    } else {
        ProviderError::unavailable(provider, format!("{} [request_id: {}]", error, request_id))
    }
}

/// Parse Retry-After header value
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let trimmed = header_value.trim();
    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    if let Ok(seconds) = trimmed.parse::<f64>() {
        if seconds.is_finite() && seconds >= 0.0 {
            return Some(Duration::from_secs_f64(seconds));
        }
    }

    // HTTP date form
    let date = chrono::DateTime::parse_from_rfc2822(trimmed).ok()?;
    let wait = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}
