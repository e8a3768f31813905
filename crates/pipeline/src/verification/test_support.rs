//! Shared LLM stub for verifier tests.

use async_trait::async_trait;
use relia_core::traits::llm::FragmentStream;
use relia_core::{Error, GenerateRequest, LanguageModel, Result};

/// Scripted LLM: optionally answers structured calls, plain calls, both, or
/// neither.
pub struct ScriptedLlm {
    structured: Option<serde_json::Value>,
    plain: Option<String>,
}

impl ScriptedLlm {
    pub fn structured(value: serde_json::Value) -> Self {
        Self {
            structured: Some(value),
            plain: None,
        }
    }

    pub fn plain(raw: &str) -> Self {
        Self {
            structured: None,
            plain: Some(raw.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self {
            structured: None,
            plain: None,
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn generate(&self, _request: GenerateRequest) -> Result<String> {
        self.plain
            .clone()
            .ok_or_else(|| Error::Llm("scripted: no plain response".to_string()))
    }

    fn generate_stream(&self, _request: GenerateRequest) -> FragmentStream<'_> {
        match self.plain.clone() {
            Some(text) => Box::pin(futures::stream::once(async move { Ok(text) })),
            None => Box::pin(futures::stream::empty()),
        }
    }

    async fn generate_structured(
        &self,
        _request: GenerateRequest,
        _schema: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        self.structured
            .clone()
            .ok_or_else(|| Error::Llm("scripted: no structured response".to_string()))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
