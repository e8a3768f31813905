//! Fallback strategies for weak retrieval.
//!
//! Two successive strategies, each ending with an RQ rescore:
//! 1. widen-K retrieval, 2. LLM query rewrites. The best candidate set wins;
//! if it still sits below the quality floor, the result is an abstain.

use std::sync::Arc;

use relia_core::{
    GenerateRequest, LanguageModel, Result, RetrievalCandidate, RetrievalDecision,
    RetrievalResult, Retriever,
};
use serde::Deserialize;

use crate::quality::RetrievalQualityScorer;
use crate::rerank::Reranker;

const QUERY_REWRITE_PROMPT: &str = "The following query didn't retrieve good results. \
Generate 3 alternative versions of this query that might retrieve better results. \
Use synonyms, rephrasings, and different angles.\n\n\
Original query: {query}\n\n\
Return a JSON object:\n\
- \"rewrites\": list of 3 alternative query strings";

const MAX_REWRITES: usize = 3;

fn rewrite_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "rewrites": {
                "type": "array",
                "items": {"type": "string"}
            }
        },
        "required": ["rewrites"]
    })
}

#[derive(Debug, Deserialize)]
struct RewriteResponse {
    #[serde(default)]
    rewrites: Vec<String>,
}

/// Thresholds and fan-out for the fallback ladder.
#[derive(Debug, Clone)]
pub struct FallbackConfig {
    /// Widened per-side K for the expansion strategy
    pub expand_k: usize,
    /// Per-side K used when retrying rewritten queries
    pub retry_top_k: usize,
    pub rerank_top_n: usize,
    /// RQ at/above which a strategy short-circuits as proceed
    pub proceed_threshold: f32,
    /// RQ floor below which even the best rewrite abstains
    pub fallback_threshold: f32,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            expand_k: 100,
            retry_top_k: 50,
            rerank_top_n: 10,
            proceed_threshold: 0.55,
            fallback_threshold: 0.25,
        }
    }
}

/// Runs the fallback ladder over the shared retrieval components.
pub struct FallbackManager {
    retriever: Arc<dyn Retriever>,
    reranker: Arc<Reranker>,
    rq_scorer: RetrievalQualityScorer,
    llm: Arc<dyn LanguageModel>,
    config: FallbackConfig,
}

impl FallbackManager {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        reranker: Arc<Reranker>,
        rq_scorer: RetrievalQualityScorer,
        llm: Arc<dyn LanguageModel>,
        config: FallbackConfig,
    ) -> Self {
        Self {
            retriever,
            reranker,
            rq_scorer,
            llm,
            config,
        }
    }

    /// Strategy 1: retry with larger per-side K, then rerank.
    async fn expanded_retrieval(&self, query: &str) -> Result<Vec<RetrievalCandidate>> {
        let candidates = self
            .retriever
            .retrieve(query, self.config.expand_k, self.config.expand_k)
            .await?;
        let reranked = self
            .reranker
            .rerank(query, candidates, self.config.rerank_top_n)
            .await?;
        tracing::info!(candidates = reranked.len(), "expanded retrieval");
        Ok(reranked)
    }

    /// Ask the LLM for alternative phrasings. Structured output first, manual
    /// JSON parse second; both failing yields no rewrites, never an error.
    async fn query_rewrites(&self, query: &str) -> Vec<String> {
        let prompt = QUERY_REWRITE_PROMPT.replace("{query}", query);
        let request = GenerateRequest::new(prompt.clone()).with_temperature(0.3);

        let parsed = match self
            .llm
            .generate_structured(request.clone(), &rewrite_schema())
            .await
        {
            Ok(value) => serde_json::from_value::<RewriteResponse>(value).ok(),
            Err(_) => match self.llm.generate(request).await {
                Ok(raw) => serde_json::from_str::<RewriteResponse>(raw.trim()).ok(),
                Err(_) => None,
            },
        };

        match parsed {
            Some(response) => {
                let rewrites: Vec<String> = response
                    .rewrites
                    .into_iter()
                    .filter(|r| !r.trim().is_empty())
                    .take(MAX_REWRITES)
                    .collect();
                tracing::info!(count = rewrites.len(), "query rewrites");
                rewrites
            }
            None => {
                tracing::warn!("query rewrite failed");
                Vec::new()
            }
        }
    }

    /// Execute the ladder for a query whose initial RQ fell into the
    /// fallback band.
    pub async fn fallback_retrieve(&self, query: &str) -> Result<RetrievalResult> {
        // Strategy 1: expansion.
        let candidates = self.expanded_retrieval(query).await?;
        let (rq, reason_codes) = self.rq_scorer.score(&candidates);

        if rq >= self.config.proceed_threshold {
            return Ok(RetrievalResult {
                candidates,
                quality_score: rq,
                reason_codes,
                decision: RetrievalDecision::Proceed,
            });
        }

        // Strategy 2: rewrites; keep the best-scoring candidate set.
        let mut best_candidates = candidates;
        let mut best_rq = rq;
        let mut best_reasons = reason_codes;

        for rewrite in self.query_rewrites(query).await {
            let retrieved = self
                .retriever
                .retrieve(&rewrite, self.config.retry_top_k, self.config.retry_top_k)
                .await?;
            // Rerank against the original query: the rewrite only widens
            // recall, relevance is still judged against what was asked.
            let reranked = self
                .reranker
                .rerank(query, retrieved, self.config.rerank_top_n)
                .await?;
            let (new_rq, new_reasons) = self.rq_scorer.score(&reranked);
            if new_rq > best_rq {
                best_candidates = reranked;
                best_rq = new_rq;
                best_reasons = new_reasons;
            }
        }

        let decision = if best_rq >= self.config.fallback_threshold {
            RetrievalDecision::Proceed
        } else {
            RetrievalDecision::Abstain
        };

        Ok(RetrievalResult {
            candidates: best_candidates,
            quality_score: best_rq,
            reason_codes: best_reasons,
            decision,
        })
    }
}
