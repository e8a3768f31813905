//! Domain value types flowing through the query pipeline.
//!
//! These are plain data carriers: stage components produce and consume them,
//! and none of them holds behavior beyond small constructors and accessors.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An ingested source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable document ID
    pub doc_id: String,
    /// Origin of the document (filename, URL, ...)
    pub source: String,
    /// Content type at ingest (e.g. "text/markdown")
    pub content_type: String,
    /// Free-form metadata supplied at ingest
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Full raw text after parsing
    pub raw_text: String,
    /// Ingest timestamp (UTC)
    pub created_at: DateTime<Utc>,
}

/// Atomic unit of retrieval. Immutable after ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable chunk ID
    pub chunk_id: String,
    /// Parent document ID
    pub doc_id: String,
    /// Chunk text (including any overlap prefix)
    pub text: String,
    /// Position index within the parent document
    pub index: usize,
    /// Metadata (heading path, source, ...)
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Approximate token count
    pub token_count: usize,
    /// Dense embedding, if computed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    /// Create a chunk with empty metadata and no embedding.
    pub fn new(
        chunk_id: impl Into<String>,
        doc_id: impl Into<String>,
        text: impl Into<String>,
        index: usize,
        token_count: usize,
    ) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            doc_id: doc_id.into(),
            text: text.into(),
            index,
            metadata: HashMap::new(),
            token_count,
            embedding: None,
        }
    }
}

/// Which retrieval path produced a candidate's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMethod {
    Bm25,
    Vector,
    Hybrid,
    Reranked,
}

/// A scored chunk produced by retrieval. Lives only for one query.
#[derive(Debug, Clone)]
pub struct RetrievalCandidate {
    pub chunk: Chunk,
    pub score: f32,
    pub source_method: SourceMethod,
}

impl RetrievalCandidate {
    pub fn new(chunk: Chunk, score: f32, source_method: SourceMethod) -> Self {
        Self {
            chunk,
            score,
            source_method,
        }
    }
}

/// Outcome of the retrieval-quality gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalDecision {
    Proceed,
    Fallback,
    Abstain,
}

/// Output of retrieval + RQ scoring; input to the fallback manager.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub candidates: Vec<RetrievalCandidate>,
    /// Retrieval quality in [0, 1]
    pub quality_score: f32,
    pub reason_codes: Vec<crate::ReasonCode>,
    pub decision: RetrievalDecision,
}

/// Query intent label assigned by understanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    Comparison,
    HowTo,
    Factual,
    Causal,
    List,
    General,
}

/// A normalized query with language, intent, and extracted constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedQuery {
    /// Whitespace-collapsed, unicode-normalized query text
    pub normalized: String,
    /// Detected language tag (e.g. "en")
    pub language: String,
    pub intent: QueryIntent,
    /// Extracted constraints (year filters, time ranges, ...)
    #[serde(default)]
    pub constraints: HashMap<String, serde_json::Value>,
}

/// Multi-hop decomposition of a query into sub-questions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecomposedQuery {
    pub original: String,
    /// 1..=5 sub-questions; a simple query decomposes to itself
    pub sub_questions: Vec<String>,
    /// Free-text hint for combining the sub-answers
    pub synthesis_instruction: String,
}

impl DecomposedQuery {
    /// A trivial decomposition: the query answers itself.
    pub fn single(query: impl Into<String>) -> Self {
        let query = query.into();
        Self {
            original: query.clone(),
            sub_questions: vec![query],
            synthesis_instruction: String::new(),
        }
    }

    /// True when the query actually split into multiple hops.
    pub fn is_multi_hop(&self) -> bool {
        self.sub_questions.len() > 1
    }
}

/// Generated answer plus the chunks its `[n]` markers cite.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub answer: String,
    /// Cited chunks in marker order (invalid indices dropped)
    pub cited_chunks: Vec<Chunk>,
    /// Short text preview per citation, parallel to `cited_chunks`
    pub cited_previews: Vec<String>,
}

/// Outcome of the verification decision maker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationDecision {
    Pass,
    Warn,
    Abstain,
}

/// Combined verification signals for one generated answer.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    /// Groundedness in [0, 1]
    pub groundedness: f32,
    /// Contradiction rate in [0, 1]
    pub contradiction_rate: f32,
    /// Self-consistency in [0, 1]; absent when skipped for budget
    pub self_consistency: Option<f32>,
    pub decision: VerificationDecision,
    pub reason_codes: Vec<crate::ReasonCode>,
}
