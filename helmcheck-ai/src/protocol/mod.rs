//! Protocol module for analysis request/response structures
//!
//! These are the values the orchestration layer builds and consumes. They are
//! provider-agnostic; each backend adapter translates them to its own wire
//! format.

pub mod types;

pub use types::{
    AnalysisContext, AnalysisType, CommitInfo, HelmChartInfo, PatternInfo, RepositoryInfo,
    Request, RequestOptions, Response, ResponseFormat, TokenUsage,
};
