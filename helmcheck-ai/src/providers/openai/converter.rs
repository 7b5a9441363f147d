//! Conversion between analysis requests and the chat completion format

use super::settings::ChatSettings;
use super::types::{
    OpenAIMessage, OpenAIRequest, OpenAIResponse, OpenAIResponseFormat, OpenAIStreamOptions,
};
use crate::protocol::{Request, Response, ResponseFormat, TokenUsage};
use crate::providers::error::{ProviderError, ProviderResult};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::time::Duration;

/// Role and ground rules given to every backend
pub const SYSTEM_PROMPT: &str = "You are an expert DevOps engineer specializing in Kubernetes, Helm, and GitOps patterns. \
You provide detailed, accurate analysis of deployment configurations, identify potential issues, \
and suggest best practices. Always structure your responses clearly and provide actionable recommendations.";

/// How a backend is told to produce JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonMode {
    /// `response_format: json_object` plus a prompt hint
    Native,
    /// Prompt hint only
    PromptOnly,
}

/// Render the request query and context as the user turn
pub fn render_user_message(request: &Request) -> String {
    let mut buf = String::new();
    buf.push_str(&request.query);
    buf.push_str("\n\n");

    let context = &request.context;
    let has_context = context.repository.is_some()
        || !context.detected_patterns.is_empty()
        || !context.helm_charts.is_empty()
        || !context.constraints.is_empty();

    if has_context {
        buf.push_str("## Context\n\n");

        if let Some(repo) = &context.repository {
            let _ = writeln!(buf, "Repository: {}/{}", repo.owner, repo.name);
            if !repo.branch.is_empty() {
                let _ = writeln!(buf, "Branch: {}", repo.branch);
            }
            if !repo.commit_sha.is_empty() {
                let _ = writeln!(buf, "Commit: {}", repo.commit_sha);
            }
            buf.push('\n');
        }

        if !context.detected_patterns.is_empty() {
            buf.push_str("### Detected GitOps Patterns:\n");
            for pattern in &context.detected_patterns {
                let _ = writeln!(
                    buf,
                    "- {} (v{}) at {}",
                    pattern.pattern_type, pattern.version, pattern.path
                );
            }
            buf.push('\n');
        }

        if !context.helm_charts.is_empty() {
            buf.push_str("### Helm Charts:\n");
            for chart in &context.helm_charts {
                let _ = writeln!(buf, "- {} (v{})", chart.name, chart.version);
                if chart.is_outdated() {
                    if let Some(latest) = &chart.latest_version {
                        let _ = writeln!(buf, "  Latest version: {}", latest);
                    }
                }
            }
            buf.push('\n');
        }

        if !context.constraints.is_empty() {
            buf.push_str("### Constraints:\n");
            for constraint in &context.constraints {
                let _ = writeln!(buf, "- {}", constraint);
            }
            buf.push('\n');
        }
    }

    match request.options.response_format {
        ResponseFormat::Json => buf.push_str("\nPlease respond in JSON format.\n"),
        ResponseFormat::Markdown => buf.push_str("\nPlease respond in Markdown format.\n"),
        ResponseFormat::Text => {}
    }

    buf
}

/// Build the chat completion body for `request`
pub fn to_openai_request(
    request: &Request,
    settings: &ChatSettings,
    json_mode: JsonMode,
    stream: bool,
) -> OpenAIRequest {
    let response_format = (json_mode == JsonMode::Native
        && request.options.response_format == ResponseFormat::Json)
        .then(OpenAIResponseFormat::json_object);

    OpenAIRequest {
        model: settings.model.clone(),
        messages: vec![
            OpenAIMessage::system(SYSTEM_PROMPT),
            OpenAIMessage::user(render_user_message(request)),
        ],
        temperature: Some(request.temperature.unwrap_or(settings.temperature)),
        max_tokens: Some(request.max_tokens.unwrap_or(settings.max_tokens)),
        stream: stream.then_some(true),
        stream_options: (stream && json_mode == JsonMode::Native).then_some(OpenAIStreamOptions {
            include_usage: Some(true),
        }),
        response_format,
        user: None,
    }
}

/// Convert a chat completion reply into a [`Response`]
pub fn from_openai_response(
    provider: &str,
    request: &Request,
    reply: OpenAIResponse,
    duration: Duration,
    cost: impl Fn(u64, u64) -> f64,
) -> ProviderResult<Response> {
    let choice = reply
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::invalid_response(provider, "response contained no choices"))?;
    let content = choice
        .message
        .and_then(|m| m.content)
        .unwrap_or_default();

    let structured_data = match request.options.response_format {
        ResponseFormat::Json => serde_json::from_str::<serde_json::Value>(&content).ok(),
        _ => None,
    };
    let confidence = structured_data
        .as_ref()
        .and_then(|data| data.get("confidence"))
        .and_then(serde_json::Value::as_f64)
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(0.0);

    let usage = reply.usage.unwrap_or_default();
    let tokens_used = TokenUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
        estimated_cost: cost(usage.prompt_tokens, usage.completion_tokens),
    };

    let mut metadata = BTreeMap::new();
    metadata.insert("model".to_string(), reply.model);
    metadata.insert(
        "finish_reason".to_string(),
        choice.finish_reason.unwrap_or_default(),
    );

    Ok(Response {
        id: request.id.clone(),
        content,
        structured_data,
        confidence,
        tokens_used,
        provider: provider.to_string(),
        duration,
        cached: false,
        metadata,
    })
}
