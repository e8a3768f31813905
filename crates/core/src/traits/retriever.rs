//! Retrieval capability.

use async_trait::async_trait;

use crate::domain::RetrievalCandidate;
use crate::Result;

/// Fused lexical + dense retrieval.
///
/// Implementations return candidates in fused-rank order, deduplicated by
/// chunk id, with every chunk resolved against the chunk store (unresolvable
/// ids dropped).
#[async_trait]
pub trait Retriever: Send + Sync + 'static {
    /// Retrieve candidates for one query string.
    async fn retrieve(
        &self,
        query: &str,
        top_k_bm25: usize,
        top_k_vector: usize,
    ) -> Result<Vec<RetrievalCandidate>>;
}
