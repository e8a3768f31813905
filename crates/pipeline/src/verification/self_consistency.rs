//! Self-consistency check: regenerate a brief answer and compare.

use std::sync::Arc;

use relia_core::{Chunk, GenerateRequest, LanguageModel};

use crate::generation::prompts::{format_chunk_evidence_block, SELF_CONSISTENCY_PROMPT};

/// Similarity used when regeneration fails.
const NEUTRAL_SELF_CONSISTENCY: f32 = 0.5;

/// Characters of each answer fed into the similarity computation. Keeps the
/// quadratic LCS bounded.
const COMPARE_CHAR_LIMIT: usize = 2000;

/// Regenerates a brief answer from the same evidence (fresh prompt, no
/// access to the first answer) and measures textual agreement.
pub struct SelfConsistencyChecker {
    llm: Arc<dyn LanguageModel>,
    temperature: f32,
}

impl SelfConsistencyChecker {
    pub fn new(llm: Arc<dyn LanguageModel>, temperature: f32) -> Self {
        Self { llm, temperature }
    }

    /// Returns a similarity in [0, 1]. Never errors.
    pub async fn check(&self, query: &str, evidence: &[Chunk], original_answer: &str) -> f32 {
        let prompt = SELF_CONSISTENCY_PROMPT
            .replace("{query}", query)
            .replace("{evidence_block}", &format_chunk_evidence_block(evidence));
        let request = GenerateRequest::new(prompt).with_temperature(self.temperature);

        let similarity = match self.llm.generate(request).await {
            Ok(brief_answer) => similarity_ratio(original_answer, &brief_answer),
            Err(_) => {
                tracing::warn!("self-consistency regeneration failed, using neutral score");
                NEUTRAL_SELF_CONSISTENCY
            }
        };

        tracing::info!(score = similarity, "self consistency");
        similarity
    }
}

/// Normalized longest-common-subsequence ratio over lowercased characters:
/// `2 * lcs / (len_a + len_b)`, in [0, 1].
pub(crate) fn similarity_ratio(a: &str, b: &str) -> f32 {
    let a: Vec<char> = a
        .to_lowercase()
        .trim()
        .chars()
        .take(COMPARE_CHAR_LIMIT)
        .collect();
    let b: Vec<char> = b
        .to_lowercase()
        .trim()
        .chars()
        .take(COMPARE_CHAR_LIMIT)
        .collect();

    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    // Two-row LCS.
    let mut previous = vec![0u32; b.len() + 1];
    let mut current = vec![0u32; b.len() + 1];
    for &ca in &a {
        for (j, &cb) in b.iter().enumerate() {
            current[j + 1] = if ca == cb {
                previous[j] + 1
            } else {
                previous[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    let lcs = previous[b.len()] as f32;

    2.0 * lcs / (a.len() + b.len()) as f32
}
