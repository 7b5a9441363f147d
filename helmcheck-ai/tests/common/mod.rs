//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use helmcheck_ai::{
    ChunkStream, Context, Provider, ProviderError, ProviderResult, Request, Response, StreamChunk,
    TokenUsage, UsageMetrics,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Scripted provider: pops one outcome per call, then repeats the fallback
pub struct MockProvider {
    name: String,
    script: Mutex<VecDeque<ProviderResult<String>>>,
    fallback: fn(&str) -> ProviderResult<String>,
    calls: AtomicU32,
    health: Option<ProviderError>,
    close_outcome: Option<ProviderError>,
    closes: AtomicU32,
    metrics: Arc<UsageMetrics>,
}

impl MockProvider {
    pub fn succeeding(name: &str) -> Self {
        Self::with_fallback(name, |name| Ok(format!("analysis from {}", name)))
    }

    pub fn failing(name: &str) -> Self {
        Self::with_fallback(name, |name| {
            Err(ProviderError::Unavailable {
                provider: name.to_string(),
                reason: "backend down".to_string(),
            })
        })
    }

    fn with_fallback(name: &str, fallback: fn(&str) -> ProviderResult<String>) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicU32::new(0),
            health: None,
            close_outcome: None,
            closes: AtomicU32::new(0),
            metrics: Arc::new(UsageMetrics::new()),
        }
    }

    /// Queue outcomes returned before the fallback applies
    pub fn then(self, outcome: ProviderResult<String>) -> Self {
        self.script.lock().push_back(outcome);
        self
    }

    /// Fail every `validate` call
    pub fn unhealthy(mut self) -> Self {
        self.health = Some(ProviderError::Unavailable {
            provider: self.name.clone(),
            reason: "health check failed".to_string(),
        });
        self
    }

    /// Fail every `close` call
    pub fn failing_close(mut self) -> Self {
        self.close_outcome = Some(ProviderError::Unavailable {
            provider: self.name.clone(),
            reason: "connection pool stuck".to_string(),
        });
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> ProviderResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| (self.fallback)(&self.name))
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(&self, _ctx: &Context, request: &Request) -> ProviderResult<Response> {
        match self.next_outcome() {
            Ok(content) => {
                let usage = TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 20,
                    total_tokens: 30,
                    estimated_cost: 0.001,
                };
                self.metrics
                    .record_success(&self.name, Duration::from_millis(5), &usage);
                Ok(Response {
                    id: request.id.clone(),
                    content,
                    tokens_used: usage,
                    provider: self.name.clone(),
                    ..Default::default()
                })
            }
            Err(error) => {
                self.metrics.record_failure(&self.name, error.kind());
                Err(error)
            }
        }
    }

    async fn analyze_stream(&self, _ctx: &Context, _request: &Request) -> ProviderResult<ChunkStream> {
        let content = self.next_outcome()?;
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            let _ = tx.send(StreamChunk::content(content)).await;
            let _ = tx.send(StreamChunk::done()).await;
        });
        Ok(rx)
    }

    async fn validate(&self, _ctx: &Context) -> ProviderResult<()> {
        match &self.health {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn metrics(&self) -> Arc<UsageMetrics> {
        self.metrics.clone()
    }

    async fn close(&self) -> ProviderResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        match &self.close_outcome {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Collect every chunk up to and including the terminal one
pub async fn drain(mut stream: ChunkStream) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();
    while let Some(chunk) = stream.recv().await {
        let terminal = chunk.is_terminal();
        chunks.push(chunk);
        if terminal {
            break;
        }
    }
    chunks
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
