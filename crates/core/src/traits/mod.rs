//! Capability traits for pluggable backends.
//!
//! Every external collaborator the pipeline consumes is expressed as a
//! capability contract; the orchestrator is parameterized over trait objects
//! and never inspects concrete types.
//!
//! # Capability map
//!
//! ```text
//! Providers:
//!   - LanguageModel: text generation, streaming, structured output
//!   - Embedder: query/text embedding
//!   - CrossEncoder: (query, passage) relevance scoring
//!
//! Retrieval:
//!   - Retriever: fused lexical + dense candidate retrieval
//!
//! Storage:
//!   - ChunkStore: documents and chunks
//!   - TraceStore: append-only request traces
//!
//! Ingest:
//!   - DocumentParser: bytes -> text by file extension
//!   - Chunker: text -> chunks
//! ```

pub mod embedder;
pub mod ingest;
pub mod llm;
pub mod rerank;
pub mod retriever;
pub mod store;

pub use embedder::Embedder;
pub use ingest::{Chunker, DocumentParser};
pub use llm::LanguageModel;
pub use rerank::CrossEncoder;
pub use retriever::Retriever;
pub use store::{ChunkStore, TraceStore};
