//! API request/response schemas for the query and ingest surfaces.

use serde::{Deserialize, Serialize};

/// Query evaluation mode.
///
/// Strict mode raises the RQ proceed threshold and tightens the verifier
/// thresholds; it does not change the decision mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    #[default]
    Normal,
    Strict,
}

/// Body of `POST /query` and `POST /query/stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    /// Optional caller-supplied conversational context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub mode: QueryMode,
    /// Soft latency budget for the request
    #[serde(default = "default_latency_budget_ms")]
    pub latency_budget_ms: u64,
}

fn default_latency_budget_ms() -> u64 {
    5000
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            context: None,
            mode: QueryMode::Normal,
            latency_budget_ms: default_latency_budget_ms(),
        }
    }

    pub fn with_mode(mut self, mode: QueryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_latency_budget_ms(mut self, budget_ms: u64) -> Self {
        self.latency_budget_ms = budget_ms;
        self
    }
}

/// Final decision returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Answer,
    Clarify,
    Abstain,
}

/// A cited evidence chunk in the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub doc_id: String,
    pub chunk_id: String,
    pub text_snippet: String,
}

/// Diagnostic block attached to every response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugInfo {
    pub retrieval_quality: f32,
    /// Top rerank scores, at most five
    pub rerank_top_scores: Vec<f32>,
    pub trace_id: String,
    pub latency_ms: f64,
}

/// Body of the `POST /query` response and the `metadata` stream event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub confidence: f32,
    pub decision: Decision,
    pub reasons: Vec<String>,
    pub debug: DebugInfo,
}

/// Body of the `POST /ingest` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub doc_id: String,
    pub chunks_created: usize,
    pub status: String,
}

/// Body of the `GET /health` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub doc_count: u64,
    pub chunk_count: u64,
    pub index_size: u64,
}
