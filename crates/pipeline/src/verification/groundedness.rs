//! Groundedness check: does the answer align with the evidence?

use std::sync::Arc;

use relia_core::{Chunk, GenerateRequest, LanguageModel};
use serde::Deserialize;

use crate::generation::prompts::{format_chunk_evidence_block, GROUNDEDNESS_CHECK_PROMPT};

/// Score used when both the structured and the manual parse fail.
const NEUTRAL_GROUNDEDNESS: f32 = 0.5;

fn groundedness_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "score": {"type": "number"},
            "unsupported_claims": {
                "type": "array",
                "items": {"type": "string"}
            }
        },
        "required": ["score"]
    })
}

#[derive(Debug, Deserialize)]
struct GroundednessResponse {
    score: f32,
    #[serde(default)]
    #[allow(dead_code)]
    unsupported_claims: Vec<String>,
}

/// Single-LLM-call groundedness scorer. Never errors: parse failures
/// collapse to the neutral score.
pub struct GroundednessChecker {
    llm: Arc<dyn LanguageModel>,
}

impl GroundednessChecker {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    pub async fn check(&self, answer: &str, evidence: &[Chunk]) -> f32 {
        let prompt = GROUNDEDNESS_CHECK_PROMPT
            .replace("{answer}", answer)
            .replace("{evidence_block}", &format_chunk_evidence_block(evidence));
        let request = GenerateRequest::new(prompt);

        let score = match self
            .llm
            .generate_structured(request.clone(), &groundedness_schema())
            .await
        {
            Ok(value) => serde_json::from_value::<GroundednessResponse>(value)
                .map(|r| r.score)
                .unwrap_or(NEUTRAL_GROUNDEDNESS),
            Err(_) => match self.llm.generate(request).await {
                Ok(raw) => serde_json::from_str::<GroundednessResponse>(raw.trim())
                    .map(|r| r.score)
                    .unwrap_or(NEUTRAL_GROUNDEDNESS),
                Err(_) => {
                    tracing::warn!("groundedness check failed, using neutral score");
                    NEUTRAL_GROUNDEDNESS
                }
            },
        };

        let score = score.clamp(0.0, 1.0);
        tracing::info!(score, "groundedness");
        score
    }
}
