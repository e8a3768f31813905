//! Closed reason-code vocabulary surfaced to callers.

use serde::{Deserialize, Serialize};

/// Stable reason codes attached to responses and traces.
///
/// The string forms are part of the API contract; extending the vocabulary
/// means adding a variant here, never emitting free-form strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// Retrieval returned no candidates
    NoResults,
    /// Top rerank score maps below the relevance floor
    LowRelevance,
    /// Top two scores are nearly indistinguishable
    LowMargin,
    /// Candidates concentrate in too few documents
    LowCoverage,
    /// Top scores vary too widely
    LowConsistency,
    /// A fallback strategy produced the final candidate set
    FallbackUsed,
    /// All fallback strategies failed to reach the quality floor
    FallbackFailed,
    /// Groundedness fell below the warn threshold
    LowGroundedness,
    /// Contradiction rate exceeded the warn threshold
    ContradictionFound,
    /// Regenerated answer disagreed with the original
    SelfInconsistency,
}

impl ReasonCode {
    /// The stable wire string for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::NoResults => "NO_RESULTS",
            ReasonCode::LowRelevance => "LOW_RELEVANCE",
            ReasonCode::LowMargin => "LOW_MARGIN",
            ReasonCode::LowCoverage => "LOW_COVERAGE",
            ReasonCode::LowConsistency => "LOW_CONSISTENCY",
            ReasonCode::FallbackUsed => "FALLBACK_USED",
            ReasonCode::FallbackFailed => "FALLBACK_FAILED",
            ReasonCode::LowGroundedness => "LOW_GROUNDEDNESS",
            ReasonCode::ContradictionFound => "CONTRADICTION_FOUND",
            ReasonCode::SelfInconsistency => "SELF_INCONSISTENCY",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
