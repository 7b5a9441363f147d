//! GitHub Copilot provider
//!
//! Copilot exposes an OpenAI-compatible chat endpoint authenticated with a
//! GitHub token. JSON output is requested through the prompt only.

mod client;

pub use client::{estimate_cost, CopilotProvider};
