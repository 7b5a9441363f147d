//! Provider abstraction and resilience layer
//!
//! This module implements the core provider abstraction: the [`Provider`]
//! trait every backend implements, the error taxonomy, and the rate limiting,
//! retry and fallback machinery that wraps the concrete OpenAI and Copilot
//! adapters.

pub mod adapter;
pub mod copilot;
pub mod error;
pub mod guard;
pub mod openai;
pub mod rate_limit;
pub mod registry;
pub mod retry;
pub mod routing;

pub use adapter::{ChunkStream, Provider, ProviderKind, StreamChunk, STREAM_BUFFER};
pub use error::{ProviderError, ProviderResult};
pub use guard::{CallGuard, Metered};
pub use rate_limit::{RateLimiter, RateLimits, RatePermit};
pub use registry::{ProviderFactory, ProviderRegistry};
pub use retry::{RetryExecutor, RetryPolicy};
pub use routing::{ChainBuilder, ProviderChain};

// Re-export concrete providers
pub use copilot::CopilotProvider;
pub use openai::OpenAIProvider;
