//! HTTP layer shared by the backend adapters
//!
//! This module implements the transport for helmcheck, handling:
//! - Connection pooling and client management
//! - Bearer authentication and credential format checks
//! - Error mapping and retry hints
//! - Request ID generation and correlation

pub mod auth;
pub mod client;
pub mod error;

pub use auth::{token_source, BearerAuth, Credential, EnvToken, StaticToken, TokenFormat, TokenSource};
pub use client::HttpClient;
pub use error::{map_http_error, map_transport_error, parse_retry_after};

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("helmcheck/", env!("CARGO_PKG_VERSION"));

/// Chat completion endpoint path, relative to a provider's base URL
pub const CHAT_COMPLETIONS: &str = "/chat/completions";

/// Model listing endpoint path, relative to a provider's base URL
pub const MODELS: &str = "/models";
