//! Contradiction detection: answer vs. evidence.

use std::sync::Arc;

use relia_core::{Chunk, GenerateRequest, LanguageModel};
use serde::Deserialize;

use crate::generation::prompts::{format_chunk_evidence_block, ANSWER_CONTRADICTION_PROMPT};

/// Rate used when both parse paths fail: assume no contradiction rather than
/// poisoning the confidence score.
const NEUTRAL_CONTRADICTION_RATE: f32 = 0.0;

fn contradiction_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "contradictions": {
                "type": "array",
                "items": {"type": "object"}
            },
            "contradiction_rate": {"type": "number"}
        },
        "required": ["contradiction_rate"]
    })
}

#[derive(Debug, Deserialize)]
struct ContradictionResponse {
    #[serde(default)]
    #[allow(dead_code)]
    contradictions: Vec<serde_json::Value>,
    #[serde(default)]
    contradiction_rate: f32,
}

/// Checks whether the generated answer contradicts the evidence it cites.
pub struct ContradictionDetector {
    llm: Arc<dyn LanguageModel>,
}

impl ContradictionDetector {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Returns a contradiction rate in [0, 1]. Never errors.
    pub async fn check(&self, answer: &str, evidence: &[Chunk]) -> f32 {
        let prompt = ANSWER_CONTRADICTION_PROMPT
            .replace("{answer}", answer)
            .replace("{evidence_block}", &format_chunk_evidence_block(evidence));
        let request = GenerateRequest::new(prompt);

        let rate = match self
            .llm
            .generate_structured(request.clone(), &contradiction_schema())
            .await
        {
            Ok(value) => serde_json::from_value::<ContradictionResponse>(value)
                .map(|r| r.contradiction_rate)
                .unwrap_or(NEUTRAL_CONTRADICTION_RATE),
            Err(_) => match self.llm.generate(request).await {
                Ok(raw) => serde_json::from_str::<ContradictionResponse>(raw.trim())
                    .map(|r| r.contradiction_rate)
                    .unwrap_or(NEUTRAL_CONTRADICTION_RATE),
                Err(_) => {
                    tracing::warn!("contradiction check failed, assuming none");
                    NEUTRAL_CONTRADICTION_RATE
                }
            },
        };

        let rate = rate.clamp(0.0, 1.0);
        tracing::info!(rate, "answer contradiction rate");
        rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verification::test_support::ScriptedLlm;

    fn chunks() -> Vec<Chunk> {
        vec![Chunk::new("c1", "d1", "the sky is blue", 0, 4)]
    }

    #[tokio::test]
    async fn test_structured_rate_clamped() {
        let llm = ScriptedLlm::structured(serde_json::json!({
            "contradictions": [{"claim": "sky is green", "evidence_num": 1, "description": "color"}],
            "contradiction_rate": 3.0
        }));
        let rate = ContradictionDetector::new(Arc::new(llm))
            .check("the sky is green", &chunks())
            .await;
        assert_eq!(rate, 1.0);
    }

    #[tokio::test]
    async fn test_manual_parse_recovery() {
        let llm = ScriptedLlm::plain(r#"{"contradictions": [], "contradiction_rate": 0.25}"#);
        let rate = ContradictionDetector::new(Arc::new(llm))
            .check("answer", &chunks())
            .await;
        assert!((rate - 0.25).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_total_failure_assumes_none() {
        let llm = ScriptedLlm::failing();
        let rate = ContradictionDetector::new(Arc::new(llm))
            .check("answer", &chunks())
            .await;
        assert_eq!(rate, 0.0);
    }
}
