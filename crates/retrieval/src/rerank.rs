//! Cross-encoder reranking.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use relia_core::{CrossEncoder, Error, Result, RetrievalCandidate, SourceMethod};

use crate::tokenize::tokenize;

/// Reranks fused candidates with a cross-encoder and keeps the top N.
pub struct Reranker {
    cross_encoder: Arc<dyn CrossEncoder>,
}

impl Reranker {
    pub fn new(cross_encoder: Arc<dyn CrossEncoder>) -> Self {
        Self { cross_encoder }
    }

    /// Rescore `candidates` against `query` and return the best `top_n`,
    /// marked `reranked`. Empty input returns empty output.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RetrievalCandidate>,
        top_n: usize,
    ) -> Result<Vec<RetrievalCandidate>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let passages: Vec<String> = candidates.iter().map(|c| c.chunk.text.clone()).collect();
        let scores = self.cross_encoder.score(query, &passages).await?;
        if scores.len() != candidates.len() {
            return Err(Error::Retrieval(format!(
                "cross-encoder returned {} scores for {} passages",
                scores.len(),
                candidates.len()
            )));
        }

        let mut scored: Vec<RetrievalCandidate> = candidates
            .into_iter()
            .zip(scores)
            .map(|(c, score)| RetrievalCandidate::new(c.chunk, score, SourceMethod::Reranked))
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
        });
        scored.truncate(top_n);

        tracing::debug!(
            output_count = scored.len(),
            top_score = scored.first().map(|c| c.score).unwrap_or(0.0),
            "reranked"
        );
        Ok(scored)
    }
}

/// Lexical-overlap cross-encoder.
///
/// Scores a passage by the fraction of query terms it covers, with a loose
/// prefix match so light inflection ("reduce" / "reduces") still counts.
/// Scores live in [0, 1], which the relevance sigmoid (midpoint 0.5) maps
/// sensibly; a model emitting raw logits needs that curve recalibrated.
pub struct LexicalCrossEncoder;

impl LexicalCrossEncoder {
    pub fn new() -> Self {
        Self
    }

    fn term_matches(term: &str, doc_terms: &HashSet<String>) -> bool {
        if doc_terms.contains(term) {
            return true;
        }
        term.len() >= 4
            && doc_terms
                .iter()
                .any(|d| (d.len() >= 4) && (d.starts_with(term) || term.starts_with(d.as_str())))
    }

    fn coverage(query_terms: &[String], passage: &str) -> f32 {
        if query_terms.is_empty() {
            return 0.0;
        }
        let doc_terms: HashSet<String> = tokenize(passage).into_iter().collect();
        let matched = query_terms
            .iter()
            .filter(|t| Self::term_matches(t, &doc_terms))
            .count();
        matched as f32 / query_terms.len() as f32
    }
}

impl Default for LexicalCrossEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CrossEncoder for LexicalCrossEncoder {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }
        let query = query.to_string();
        let passages = passages.to_vec();
        // Scoring is synchronous compute; keep it off the async scheduler.
        tokio::task::spawn_blocking(move || {
            let query_terms = tokenize(&query);
            passages
                .iter()
                .map(|p| Self::coverage(&query_terms, p))
                .collect()
        })
        .await
        .map_err(|e| Error::TaskJoin(e.to_string()))
    }

    fn model_name(&self) -> &str {
        "lexical-overlap"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relia_core::Chunk;

    fn candidate(id: &str, text: &str, score: f32) -> RetrievalCandidate {
        RetrievalCandidate::new(
            Chunk::new(id, "doc", text, 0, 1),
            score,
            SourceMethod::Hybrid,
        )
    }

    #[tokio::test]
    async fn test_rerank_orders_by_relevance() {
        let reranker = Reranker::new(Arc::new(LexicalCrossEncoder::new()));
        let candidates = vec![
            candidate("off", "pasta carbonara with eggs and cheese", 0.9),
            candidate("on", "hybrid retrieval merges lexical and dense search", 0.1),
        ];

        let reranked = reranker
            .rerank("how does hybrid retrieval work", candidates, 10)
            .await
            .unwrap();

        assert_eq!(reranked[0].chunk.chunk_id, "on");
        assert_eq!(reranked[0].source_method, SourceMethod::Reranked);
        assert!(reranked[0].score > reranked[1].score);
    }

    #[tokio::test]
    async fn test_rerank_truncates_to_top_n() {
        let reranker = Reranker::new(Arc::new(LexicalCrossEncoder::new()));
        let candidates = (0..5)
            .map(|i| candidate(&format!("c{i}"), "retrieval retrieval", 0.0))
            .collect();
        let reranked = reranker.rerank("retrieval", candidates, 2).await.unwrap();
        assert_eq!(reranked.len(), 2);
    }

    #[tokio::test]
    async fn test_rerank_empty_input() {
        let reranker = Reranker::new(Arc::new(LexicalCrossEncoder::new()));
        let reranked = reranker.rerank("query", Vec::new(), 10).await.unwrap();
        assert!(reranked.is_empty());
    }

    #[test]
    fn test_coverage_prefix_match() {
        let terms = tokenize("reduce hallucination");
        let score = LexicalCrossEncoder::coverage(
            &terms,
            "grounding reduces hallucination in generated answers",
        );
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_coverage_disjoint_is_zero() {
        let terms = tokenize("capital france");
        let score = LexicalCrossEncoder::coverage(&terms, "retrieval augmented generation");
        assert_eq!(score, 0.0);
    }
}
