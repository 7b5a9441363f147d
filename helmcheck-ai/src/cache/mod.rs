//! Response caching
//!
//! This module provides:
//! - The [`Cache`] interface and its bounded in-memory implementation
//! - Deterministic request fingerprinting ([`generate_cache_key`])
//! - The cache-aside [`CachedProvider`] decorator

mod memory;
mod provider;

pub use memory::{CleanupHandle, MemoryCache};
pub use provider::CachedProvider;

use crate::protocol::{AnalysisContext, AnalysisType, Request, Response};
use crate::providers::error::{ProviderError, ProviderResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Key/response store with per-entry expiry
pub trait Cache: Send + Sync {
    /// Copy of the stored response with `cached` set, or `None` on miss or expiry
    fn get(&self, key: &str) -> Option<Response>;

    /// Store a response for `ttl`; fails without storing when the entry cannot fit
    fn set(&self, key: &str, response: &Response, ttl: Duration) -> ProviderResult<()>;

    /// Remove one entry, returning whether it existed
    fn delete(&self, key: &str) -> bool;

    fn clear(&self);

    fn stats(&self) -> CacheStats;
}

/// Counters describing cache effectiveness
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Bytes currently accounted to live entries
    pub size: u64,
    pub max_size: u64,
    pub count: usize,
    /// Hits as a percentage of lookups
    pub hit_rate: f64,
    pub average_item_size: u64,
}

#[derive(Serialize)]
struct KeyMaterial<'a> {
    query: &'a str,
    #[serde(rename = "type")]
    analysis_type: AnalysisType,
    max_tokens: Option<u32>,
    temperature: Option<f64>,
    context: &'a AnalysisContext,
}

/// SHA-256 hex digest of the request's canonical form
///
/// Only query, analysis type, max tokens, temperature and context take part;
/// the request id and metadata never influence the key.
pub fn generate_cache_key(request: &Request) -> ProviderResult<String> {
    let material = KeyMaterial {
        query: &request.query,
        analysis_type: request.analysis_type,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        context: &request.context,
    };
    let canonical = serde_json::to_vec(&material).map_err(|e| ProviderError::Cache {
        operation: "key".to_string(),
        reason: e.to_string(),
    })?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}
