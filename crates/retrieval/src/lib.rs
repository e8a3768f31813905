//! Hybrid retrieval for the relia query service
//!
//! Features:
//! - BM25 lexical index with atomic rebuild swap and JSON persistence
//! - Dense inner-product index over unit vectors with external string ids
//! - Reciprocal Rank Fusion with a stable tie order
//! - Hybrid retriever (embed once, concurrent lexical + dense, fuse, resolve)
//! - Cross-encoder reranking with a lexical-overlap default scorer
//! - Retrieval-quality scoring and the fallback ladder

pub mod bm25;
pub mod fallback;
pub mod hybrid;
pub mod quality;
pub mod rerank;
pub mod rrf;
pub mod tokenize;
pub mod vector;

pub use bm25::Bm25Index;
pub use fallback::{FallbackConfig, FallbackManager};
pub use hybrid::{dedup_candidates, HybridRetriever};
pub use quality::{RetrievalQualityScorer, RqWeights};
pub use rerank::{LexicalCrossEncoder, Reranker};
pub use rrf::reciprocal_rank_fusion;
pub use tokenize::tokenize;
pub use vector::VectorIndex;
