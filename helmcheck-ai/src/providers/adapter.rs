//! Provider adapter trait and streaming types
//!
//! Defines the core abstraction every AI backend implements. Decorators
//! (caching, fallback chains) implement the same trait so callers never know
//! which shape they hold.

use crate::context::Context;
use crate::metrics::UsageMetrics;
use crate::protocol::{Request, Response};
use crate::providers::error::{ProviderError, ProviderResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Capacity of the channel behind every [`ChunkStream`]
pub const STREAM_BUFFER: usize = 100;

/// Receiving side of a streamed analysis
pub type ChunkStream = mpsc::Receiver<StreamChunk>;

/// Core provider trait that all AI backends must implement
#[async_trait]
pub trait Provider: Send + Sync {
    /// Get the provider's name
    fn name(&self) -> &str;

    /// Run one analysis to completion
    async fn analyze(&self, ctx: &Context, request: &Request) -> ProviderResult<Response>;

    /// Run one analysis, delivering content incrementally
    ///
    /// The stream ends with exactly one terminal chunk: `done` or an error.
    async fn analyze_stream(&self, ctx: &Context, request: &Request) -> ProviderResult<ChunkStream>;

    /// Cheap round trip proving the provider is reachable and authorized
    async fn validate(&self, ctx: &Context) -> ProviderResult<()>;

    /// Usage counters for this provider
    fn metrics(&self) -> Arc<UsageMetrics>;

    /// Release resources; safe to call more than once
    async fn close(&self) -> ProviderResult<()>;
}

/// One increment of a streamed response
#[derive(Debug, Clone, Default)]
pub struct StreamChunk {
    pub content: String,
    pub done: bool,
    pub error: Option<ProviderError>,
}

impl StreamChunk {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn done() -> Self {
        Self {
            done: true,
            ..Default::default()
        }
    }

    pub fn error(error: ProviderError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    /// Whether no further chunks follow this one
    pub fn is_terminal(&self) -> bool {
        self.done || self.error.is_some()
    }
}

/// Backend types known to the built-in registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    Copilot,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::OpenAI, ProviderKind::Copilot];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Copilot => "copilot",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAI),
            "copilot" => Ok(ProviderKind::Copilot),
            other => Err(ProviderError::NotSupported(format!(
                "unsupported provider type: {}",
                other
            ))),
        }
    }
}
