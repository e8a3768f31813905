//! Multi-hop query decomposition via the LLM.

use std::sync::Arc;

use relia_core::{DecomposedQuery, GenerateRequest, LanguageModel};
use serde::Deserialize;

use crate::generation::prompts::QUERY_DECOMPOSITION_PROMPT;

/// Upper bound on sub-questions; anything past this is noise.
pub const MAX_SUB_QUESTIONS: usize = 5;

fn decomposition_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "sub_questions": {
                "type": "array",
                "items": {"type": "string"}
            },
            "synthesis_instruction": {"type": "string"}
        },
        "required": ["sub_questions", "synthesis_instruction"]
    })
}

#[derive(Debug, Deserialize)]
struct DecompositionResponse {
    #[serde(default)]
    sub_questions: Vec<String>,
    #[serde(default)]
    synthesis_instruction: String,
}

/// Stage 2: split a complex query into at most five sub-questions.
///
/// Every failure mode collapses to the trivial decomposition (the query
/// itself); decomposition never fails the request.
pub struct QueryDecomposer {
    llm: Arc<dyn LanguageModel>,
}

impl QueryDecomposer {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    pub async fn decompose(&self, query: &str) -> DecomposedQuery {
        let prompt = QUERY_DECOMPOSITION_PROMPT.replace("{query}", query);
        let request = GenerateRequest::new(prompt);

        let parsed = match self
            .llm
            .generate_structured(request.clone(), &decomposition_schema())
            .await
        {
            Ok(value) => serde_json::from_value::<DecompositionResponse>(value).ok(),
            Err(_) => match self.llm.generate(request).await {
                Ok(raw) => serde_json::from_str::<DecompositionResponse>(raw.trim()).ok(),
                Err(_) => None,
            },
        };

        let (mut sub_questions, synthesis) = match parsed {
            Some(response) => (
                response
                    .sub_questions
                    .into_iter()
                    .filter(|q| !q.trim().is_empty())
                    .take(MAX_SUB_QUESTIONS)
                    .collect(),
                response.synthesis_instruction,
            ),
            None => {
                tracing::warn!(query, "decomposition failed, using query as-is");
                (Vec::new(), String::new())
            }
        };

        if sub_questions.is_empty() {
            sub_questions = vec![query.to_string()];
        }

        tracing::info!(
            original = query,
            sub_questions = sub_questions.len(),
            "decomposed"
        );

        DecomposedQuery {
            original: query.to_string(),
            sub_questions,
            synthesis_instruction: synthesis,
        }
    }
}
