//! Core traits and types for the relia query service
//!
//! This crate provides the foundational vocabulary used across all other
//! crates:
//! - Domain value types (chunks, retrieval candidates, stage results)
//! - API request/response schemas
//! - The closed reason-code vocabulary
//! - LLM request/response types
//! - Request trace types
//! - Capability traits for pluggable backends
//! - Error types

pub mod api;
pub mod domain;
pub mod error;
pub mod llm_types;
pub mod reason;
pub mod trace;
pub mod traits;

pub use api::{
    Citation, DebugInfo, Decision, HealthResponse, IngestResponse, QueryMode, QueryRequest,
    QueryResponse,
};
pub use domain::{
    Chunk, DecomposedQuery, Document, GenerationResult, ProcessedQuery, QueryIntent,
    RetrievalCandidate, RetrievalDecision, RetrievalResult, SourceMethod, VerificationDecision,
    VerificationResult,
};
pub use error::{Error, Result};
pub use llm_types::GenerateRequest;
pub use reason::ReasonCode;
pub use trace::{Trace, TraceContext, TraceSpan};

pub use traits::{
    Chunker, ChunkStore, CrossEncoder, DocumentParser, Embedder, LanguageModel, Retriever,
    TraceStore,
};
