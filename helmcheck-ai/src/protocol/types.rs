//! Core request/response types for chart analysis
//!
//! This module contains the value types exchanged between the orchestration
//! layer and the provider layer. The design prioritizes:
//! - Deterministic serialization (ordered maps) so requests can be fingerprinted
//! - Forward compatibility through optional fields and metadata
//! - Provider neutrality: nothing here knows about a vendor wire format

use crate::providers::error::{ProviderError, ProviderResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Kind of analysis being requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    PatternDetection,
    Compatibility,
    RiskAssessment,
    Recommendation,
    Impact,
    Strategy,
    Conflict,
    #[default]
    General,
}

impl AnalysisType {
    /// Wire tag for this analysis type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PatternDetection => "pattern_detection",
            Self::Compatibility => "compatibility",
            Self::RiskAssessment => "risk_assessment",
            Self::Recommendation => "recommendation",
            Self::Impact => "impact",
            Self::Strategy => "strategy",
            Self::Conflict => "conflict",
            Self::General => "general",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired shape of the model output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
    Markdown,
}

/// Repository the analysis is about
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub commit_sha: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

/// A deployment pattern detected in the repository (flux, argocd, kustomize, ...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternInfo {
    #[serde(rename = "type")]
    pub pattern_type: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
}

/// A Helm chart found in the repository
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HelmChartInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub breaking_changes: Vec<String>,
}

impl HelmChartInfo {
    /// Whether a newer release than the deployed one is known
    pub fn is_outdated(&self) -> bool {
        self.latest_version
            .as_deref()
            .is_some_and(|latest| !latest.is_empty() && latest != self.version)
    }
}

/// A recent commit touching the repository
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_changed: Vec<String>,
}

/// Everything the analysis layer knows about the repository under review
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryInfo>,
    #[serde(default)]
    pub detected_patterns: Vec<PatternInfo>,
    #[serde(default)]
    pub helm_charts: Vec<HelmChartInfo>,
    #[serde(default)]
    pub git_history: Vec<CommitInfo>,
    #[serde(default)]
    pub current_state: BTreeMap<String, Value>,
    #[serde(default)]
    pub target_state: BTreeMap<String, Value>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub additional_context: BTreeMap<String, Value>,
}

/// Per-request behaviour switches
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    #[serde(default)]
    pub stream: bool,

    #[serde(default)]
    pub use_cache: bool,

    /// Overrides the cache decorator's default TTL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_ttl: Option<Duration>,

    /// Overrides the provider's configured retry count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,

    /// Overrides the provider's initial retry delay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<Duration>,

    /// Upper bound for the whole call, including limiter waits and retries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    #[serde(default)]
    pub response_format: ResponseFormat,

    #[serde(default)]
    pub include_confidence: bool,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_options: BTreeMap<String, Value>,
}

/// An analysis request handed to a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Caller-assigned identifier, echoed in the response
    pub id: String,

    #[serde(default)]
    pub context: AnalysisContext,

    pub query: String,

    #[serde(rename = "type", default)]
    pub analysis_type: AnalysisType,

    /// Falls back to the provider default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Falls back to the provider default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default)]
    pub options: RequestOptions,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Request {
    /// Create a request with a generated id
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            context: AnalysisContext::default(),
            query: query.into(),
            analysis_type: AnalysisType::General,
            max_tokens: None,
            temperature: None,
            options: RequestOptions::default(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_type(mut self, analysis_type: AnalysisType) -> Self {
        self.analysis_type = analysis_type;
        self
    }

    pub fn with_context(mut self, context: AnalysisContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// Enable cache lookups for this request
    pub fn with_cache(mut self, ttl: Option<Duration>) -> Self {
        self.options.use_cache = true;
        self.options.cache_ttl = ttl;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Reject requests no backend could serve
    pub fn validate(&self) -> ProviderResult<()> {
        if self.query.trim().is_empty() {
            return Err(ProviderError::InvalidRequest("query must not be empty".to_string()));
        }
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ProviderError::InvalidRequest(format!(
                    "temperature must be between 0.0 and 2.0, got {}",
                    temperature
                )));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(ProviderError::InvalidRequest(
                "max_tokens must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Token accounting for one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Estimated cost in USD
    pub estimated_cost: f64,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.estimated_cost += other.estimated_cost;
    }
}

/// Result of an analysis call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Echoes the request id
    pub id: String,

    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<Value>,

    #[serde(default)]
    pub confidence: f64,

    #[serde(default)]
    pub tokens_used: TokenUsage,

    /// Name of the provider that produced the content
    pub provider: String,

    #[serde(default)]
    pub duration: Duration,

    /// Set only on copies served from a cache
    #[serde(default)]
    pub cached: bool,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}
