//! Hybrid retriever.
//!
//! Blends lexical and dense recall: embed the query once, run both searches
//! concurrently, RRF-merge, then resolve chunk ids against the chunk store in
//! one batched lookup.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use relia_core::{
    ChunkStore, Embedder, Error, Result, RetrievalCandidate, Retriever, SourceMethod,
};

use crate::bm25::Bm25Index;
use crate::rrf::reciprocal_rank_fusion;
use crate::vector::VectorIndex;

/// Fused lexical + dense retriever.
pub struct HybridRetriever {
    bm25: Arc<Bm25Index>,
    vectors: Arc<VectorIndex>,
    chunk_store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn Embedder>,
    rrf_k: u32,
}

impl HybridRetriever {
    pub fn new(
        bm25: Arc<Bm25Index>,
        vectors: Arc<VectorIndex>,
        chunk_store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn Embedder>,
        rrf_k: u32,
    ) -> Self {
        Self {
            bm25,
            vectors,
            chunk_store,
            embedder,
            rrf_k,
        }
    }
}

#[async_trait]
impl Retriever for HybridRetriever {
    async fn retrieve(
        &self,
        query: &str,
        top_k_bm25: usize,
        top_k_vector: usize,
    ) -> Result<Vec<RetrievalCandidate>> {
        // Embed exactly once; an embedding failure is a retrieval-stage error
        // and surfaces upward.
        let query_embedding = self.embedder.embed_query(query).await?;

        // Both index scans are CPU-bound; run them concurrently off the
        // async scheduler.
        let bm25 = self.bm25.clone();
        let vectors = self.vectors.clone();
        let query_owned = query.to_string();

        let lexical_task = tokio::task::spawn_blocking(move || bm25.search(&query_owned, top_k_bm25));
        let dense_task =
            tokio::task::spawn_blocking(move || vectors.search(&query_embedding, top_k_vector));

        let (lexical, dense) = tokio::join!(lexical_task, dense_task);
        let lexical = lexical.map_err(|e| Error::TaskJoin(e.to_string()))?;
        let dense = dense.map_err(|e| Error::TaskJoin(e.to_string()))?;

        tracing::debug!(
            bm25_count = lexical.len(),
            vector_count = dense.len(),
            "retrieval results"
        );

        let fused = reciprocal_rank_fusion(&[dense, lexical], self.rrf_k);
        if fused.is_empty() {
            return Ok(Vec::new());
        }

        // Resolve ids in one batched lookup; unresolved ids drop silently.
        let chunk_ids: Vec<String> = fused.iter().map(|(id, _)| id.clone()).collect();
        let mut chunks = self.chunk_store.get_chunks(&chunk_ids).await?;

        let candidates = fused
            .into_iter()
            .filter_map(|(chunk_id, score)| {
                chunks
                    .remove(&chunk_id)
                    .map(|chunk| RetrievalCandidate::new(chunk, score, SourceMethod::Hybrid))
            })
            .collect();

        Ok(candidates)
    }
}

/// Deduplicate candidates by chunk id, keeping the highest-scoring copy.
/// Relative order of the surviving candidates is preserved.
pub fn dedup_candidates(candidates: Vec<RetrievalCandidate>) -> Vec<RetrievalCandidate> {
    let mut best: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<Option<RetrievalCandidate>> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        match best.get(&candidate.chunk.chunk_id) {
            Some(&slot) => {
                let existing = kept[slot]
                    .as_ref()
                    .map(|c| c.score)
                    .unwrap_or(f32::NEG_INFINITY);
                if candidate.score > existing {
                    kept[slot] = Some(candidate);
                }
            }
            None => {
                best.insert(candidate.chunk.chunk_id.clone(), kept.len());
                kept.push(Some(candidate));
            }
        }
    }

    kept.into_iter().flatten().collect()
}
