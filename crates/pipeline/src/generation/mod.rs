//! Answer generation from an evidence block.

pub mod prompts;

use std::pin::Pin;
use std::sync::Arc;

use async_stream::stream;
use futures::{Stream, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use relia_core::{
    DecomposedQuery, GenerateRequest, GenerationResult, LanguageModel, QueryMode, Result,
    RetrievalCandidate,
};

use prompts::{
    format_decomposition_context, format_evidence_block, ANSWER_GENERATION_PROMPT,
    ANSWER_GENERATION_STRICT_SYSTEM, ANSWER_GENERATION_SYSTEM, MAX_EVIDENCE_CHUNKS,
};

static CITATION_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").expect("static regex"));

const PREVIEW_CHARS: usize = 200;

/// One event from an incremental generation: text fragments while the model
/// streams, then a single terminal result carrying the assembled answer.
#[derive(Debug, Clone)]
pub enum GenerationEvent {
    Fragment(String),
    Completed(GenerationResult),
}

/// Stage 7: prompt the LLM with a numbered evidence block and parse the
/// `[n]` citation markers out of the answer.
pub struct AnswerGenerator {
    llm: Arc<dyn LanguageModel>,
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    fn build_request(
        query: &str,
        evidence: &[RetrievalCandidate],
        decomposition: Option<&DecomposedQuery>,
        mode: QueryMode,
    ) -> GenerateRequest {
        let evidence_block = format_evidence_block(evidence);
        let decomposition_context = decomposition
            .filter(|d| d.is_multi_hop())
            .map(|d| format_decomposition_context(&d.sub_questions, &d.synthesis_instruction))
            .unwrap_or_default();

        let prompt = ANSWER_GENERATION_PROMPT
            .replace("{query}", query)
            .replace("{evidence_block}", &evidence_block)
            .replace("{decomposition_context}", &decomposition_context);

        let system = match mode {
            QueryMode::Strict => ANSWER_GENERATION_STRICT_SYSTEM,
            QueryMode::Normal => ANSWER_GENERATION_SYSTEM,
        };

        GenerateRequest::new(prompt).with_system(system)
    }

    /// Map `[n]` markers back to evidence-block positions. Invalid indices
    /// are ignored; each cited chunk appears once, in marker order.
    fn parse_citations(answer: &str, evidence: &[RetrievalCandidate]) -> GenerationResult {
        let block_len = evidence.len().min(MAX_EVIDENCE_CHUNKS);
        let mut indices: Vec<usize> = CITATION_MARKER
            .captures_iter(answer)
            .filter_map(|c| c[1].parse::<usize>().ok())
            .filter(|&n| n >= 1 && n <= block_len)
            .collect();
        indices.sort_unstable();
        indices.dedup();

        let mut cited_chunks = Vec::with_capacity(indices.len());
        let mut cited_previews = Vec::with_capacity(indices.len());
        for idx in indices {
            let chunk = evidence[idx - 1].chunk.clone();
            cited_previews.push(chunk.text.chars().take(PREVIEW_CHARS).collect());
            cited_chunks.push(chunk);
        }

        GenerationResult {
            answer: answer.to_string(),
            cited_chunks,
            cited_previews,
        }
    }

    /// Generate a cited answer. A failed generation is fatal: no partial
    /// answer is returned.
    pub async fn generate(
        &self,
        query: &str,
        evidence: &[RetrievalCandidate],
        decomposition: Option<&DecomposedQuery>,
        mode: QueryMode,
    ) -> Result<GenerationResult> {
        let request = Self::build_request(query, evidence, decomposition, mode);
        let answer = self.llm.generate(request).await?;

        let result = Self::parse_citations(&answer, evidence);
        tracing::info!(
            answer_len = result.answer.len(),
            citations = result.cited_chunks.len(),
            "answer generated"
        );
        Ok(result)
    }

    /// Incremental generation: yields fragments as they arrive, then one
    /// terminal [`GenerationEvent::Completed`].
    pub fn generate_stream<'a>(
        &'a self,
        query: &str,
        evidence: &'a [RetrievalCandidate],
        decomposition: Option<&DecomposedQuery>,
        mode: QueryMode,
    ) -> Pin<Box<dyn Stream<Item = Result<GenerationEvent>> + Send + 'a>> {
        let request = Self::build_request(query, evidence, decomposition, mode);

        Box::pin(stream! {
            let mut fragments = self.llm.generate_stream(request);
            let mut answer = String::new();

            while let Some(fragment) = fragments.next().await {
                match fragment {
                    Ok(text) => {
                        answer.push_str(&text);
                        yield Ok(GenerationEvent::Fragment(text));
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }

            let result = Self::parse_citations(&answer, evidence);
            tracing::info!(
                answer_len = result.answer.len(),
                citations = result.cited_chunks.len(),
                "answer generated (stream)"
            );
            yield Ok(GenerationEvent::Completed(result));
        })
    }
}
