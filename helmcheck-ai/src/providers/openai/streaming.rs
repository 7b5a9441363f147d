//! Server-sent event streaming for chat completion endpoints

use super::types::{OpenAIStreamChunk, OpenAIUsage};
use crate::context::Context;
use crate::metrics::UsageMetrics;
use crate::protocol::TokenUsage;
use crate::providers::adapter::{ChunkStream, StreamChunk, STREAM_BUFFER};
use crate::providers::error::ProviderError;
use crate::providers::rate_limit::RateLimiter;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Prices a completion from prompt and completion token counts
pub type CostFn = Arc<dyn Fn(u64, u64) -> f64 + Send + Sync>;

/// Records what a stream consumed once it ends
pub struct StreamMeter {
    pub provider: String,
    pub metrics: Arc<UsageMetrics>,
    pub limiter: Arc<RateLimiter>,
    pub cost: CostFn,
    pub started: Instant,
}

impl StreamMeter {
    fn finish(&self, reported: Option<OpenAIUsage>, text: &str) {
        let usage = match reported {
            Some(usage) => TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
                estimated_cost: (self.cost)(usage.prompt_tokens, usage.completion_tokens),
            },
            None => {
                let words = estimate_tokens(text);
                TokenUsage {
                    prompt_tokens: 0,
                    completion_tokens: words,
                    total_tokens: words,
                    estimated_cost: (self.cost)(0, words),
                }
            }
        };
        self.limiter.record_tokens(usage.total_tokens);
        self.metrics
            .record_success(&self.provider, self.started.elapsed(), &usage);
    }

    fn fail(&self, error: &ProviderError) {
        self.metrics.record_failure(&self.provider, error.kind());
    }
}

/// Rough token count for streams that never report usage
pub fn estimate_tokens(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

enum Step {
    Continue,
    Done,
}

/// Pump an open event-stream body into a bounded chunk channel
///
/// The returned receiver yields content chunks followed by exactly one
/// terminal chunk. Dropping the receiver stops the pump.
pub fn spawn_stream(ctx: Context, response: reqwest::Response, meter: StreamMeter) -> ChunkStream {
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);

    tokio::spawn(async move {
        let mut events = response.bytes_stream().eventsource();
        let mut text = String::new();
        let mut usage = None;
        let mut finished = false;

        loop {
            let next = tokio::select! {
                biased;
                err = ctx.done() => {
                    meter.fail(&err);
                    let _ = tx.send(StreamChunk::error(err)).await;
                    return;
                }
                _ = tx.closed() => {
                    debug!(provider = %meter.provider, "stream receiver dropped");
                    return;
                }
                next = events.next() => next,
            };

            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    let err = ProviderError::invalid_response(&meter.provider, format!("stream error: {}", e));
                    meter.fail(&err);
                    let _ = tx.send(StreamChunk::error(err)).await;
                    return;
                }
                None if finished => break,
                None => {
                    let err = ProviderError::invalid_response(&meter.provider, "stream ended before completion");
                    meter.fail(&err);
                    let _ = tx.send(StreamChunk::error(err)).await;
                    return;
                }
            };

            let data = event.data.trim();
            if data == "[DONE]" {
                break;
            }
            if data.is_empty() {
                continue;
            }

            let chunk = match serde_json::from_str::<OpenAIStreamChunk>(data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(provider = %meter.provider, "Failed to parse stream chunk: {}", e);
                    continue;
                }
            };

            match forward(&tx, chunk, &mut text, &mut usage, &mut finished).await {
                Ok(Step::Continue) => {}
                Ok(Step::Done) => break,
                Err(()) => return,
            }
        }

        meter.finish(usage, &text);
        let _ = tx.send(StreamChunk::done()).await;
    });

    rx
}

/// Forward one parsed chunk; `Err` means the receiver is gone
async fn forward(
    tx: &mpsc::Sender<StreamChunk>,
    chunk: OpenAIStreamChunk,
    text: &mut String,
    usage: &mut Option<OpenAIUsage>,
    finished: &mut bool,
) -> Result<Step, ()> {
    if chunk.usage.is_some() {
        *usage = chunk.usage;
    }
    for choice in chunk.choices {
        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            text.push_str(&content);
            tx.send(StreamChunk::content(content)).await.map_err(|_| ())?;
        }
        if choice.finish_reason.is_some() {
            *finished = true;
        }
    }
    // Usage arrives after the finish reason when it was requested
    Ok(if *finished && usage.is_some() {
        Step::Done
    } else {
        Step::Continue
    })
}
