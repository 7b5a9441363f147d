//! OpenAI provider implementation
//!
//! This module provides an adapter for the OpenAI chat completion API. The
//! request rendering, SSE streaming and endpoint core are shared with the
//! other OpenAI-compatible backends.

mod client;
pub mod converter;
pub(crate) mod endpoint;
pub mod pricing;
pub mod settings;
pub mod streaming;
pub mod types;

pub use client::OpenAIProvider;
pub use converter::{render_user_message, JsonMode, SYSTEM_PROMPT};
pub use settings::ChatSettings;
pub use types::{OpenAIRequest, OpenAIResponse, OpenAIStreamChunk};
