//! Retrieval-quality (RQ) scoring.
//!
//! `rq = w1*relevance + w2*margin + w3*coverage + w4*consistency`, every
//! component clamped to [0, 1].

use std::collections::HashSet;

use relia_core::{ReasonCode, RetrievalCandidate};

/// Sigmoid midpoint for relevance normalization. Calibrated against scorers
/// emitting values in [0, 1]; recalibrate when swapping in a model with a
/// different score distribution.
pub const RELEVANCE_MIDPOINT: f32 = 0.5;
/// Sigmoid steepness for relevance normalization.
pub const RELEVANCE_STEEPNESS: f32 = 10.0;

const LOW_RELEVANCE_THRESHOLD: f32 = 0.4;
const LOW_MARGIN_THRESHOLD: f32 = 0.1;
const LOW_COVERAGE_THRESHOLD: f32 = 0.3;
const LOW_CONSISTENCY_THRESHOLD: f32 = 0.3;

const EPSILON: f32 = 1e-8;

/// RQ component weights. Must sum to 1.
#[derive(Debug, Clone, Copy)]
pub struct RqWeights {
    pub relevance: f32,
    pub margin: f32,
    pub coverage: f32,
    pub consistency: f32,
}

impl Default for RqWeights {
    fn default() -> Self {
        Self {
            relevance: 0.45,
            margin: 0.20,
            coverage: 0.15,
            consistency: 0.20,
        }
    }
}

/// Scores a reranked candidate list on four axes.
#[derive(Debug, Clone)]
pub struct RetrievalQualityScorer {
    weights: RqWeights,
}

impl RetrievalQualityScorer {
    pub fn new(weights: RqWeights) -> Self {
        Self { weights }
    }

    /// Score candidates. Returns `(rq, reason_codes)` with `rq` in [0, 1].
    /// Empty input scores 0.0 with `NO_RESULTS`.
    pub fn score(&self, candidates: &[RetrievalCandidate]) -> (f32, Vec<ReasonCode>) {
        if candidates.is_empty() {
            return (0.0, vec![ReasonCode::NoResults]);
        }

        let scores: Vec<f32> = candidates.iter().map(|c| c.score).collect();

        let relevance = sigmoid_normalize(scores[0]);

        let margin = if scores.len() > 1 {
            ((scores[0] - scores[1]) / (scores[0].abs() + EPSILON)).clamp(0.0, 1.0)
        } else {
            1.0
        };

        let unique_docs: HashSet<&str> = candidates
            .iter()
            .map(|c| c.chunk.doc_id.as_str())
            .collect();
        let coverage = (unique_docs.len() as f32 / candidates.len() as f32).min(1.0);

        let top = &scores[..scores.len().min(5)];
        let consistency = if top.len() > 1 {
            let mean: f32 = top.iter().sum::<f32>() / top.len() as f32;
            let variance: f32 =
                top.iter().map(|s| (s - mean) * (s - mean)).sum::<f32>() / top.len() as f32;
            let std = variance.sqrt();
            (1.0 - std / (mean + EPSILON)).clamp(0.0, 1.0)
        } else {
            1.0
        };

        let rq = (self.weights.relevance * relevance
            + self.weights.margin * margin
            + self.weights.coverage * coverage
            + self.weights.consistency * consistency)
            .clamp(0.0, 1.0);

        let mut reason_codes = Vec::new();
        if relevance < LOW_RELEVANCE_THRESHOLD {
            reason_codes.push(ReasonCode::LowRelevance);
        }
        if margin < LOW_MARGIN_THRESHOLD {
            reason_codes.push(ReasonCode::LowMargin);
        }
        if coverage < LOW_COVERAGE_THRESHOLD {
            reason_codes.push(ReasonCode::LowCoverage);
        }
        if consistency < LOW_CONSISTENCY_THRESHOLD {
            reason_codes.push(ReasonCode::LowConsistency);
        }

        tracing::debug!(
            rq,
            relevance,
            margin,
            coverage,
            consistency,
            reasons = reason_codes.len(),
            "rq scored"
        );
        (rq, reason_codes)
    }
}

impl Default for RetrievalQualityScorer {
    fn default() -> Self {
        Self::new(RqWeights::default())
    }
}

/// Map an arbitrary top score into [0, 1].
fn sigmoid_normalize(score: f32) -> f32 {
    1.0 / (1.0 + (-RELEVANCE_STEEPNESS * (score - RELEVANCE_MIDPOINT)).exp())
}
