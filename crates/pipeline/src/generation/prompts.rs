//! Prompt templates for generation and verification.

use relia_core::{Chunk, RetrievalCandidate};

pub const ANSWER_GENERATION_SYSTEM: &str = "You are a precise, factual assistant. Answer questions using ONLY the provided evidence.
Rules:
- Cite evidence using [1], [2], etc. markers matching the evidence numbers.
- If the evidence doesn't contain enough information, say so clearly.
- Never make up information not present in the evidence.
- Be concise and direct.";

pub const ANSWER_GENERATION_STRICT_SYSTEM: &str = "You are a precise, factual assistant operating in STRICT mode.
Rules:
- ONLY state facts that are DIRECTLY and EXPLICITLY supported by the evidence.
- Cite every claim with [1], [2], etc.
- If ANY doubt exists about whether the evidence supports a claim, do NOT include it.
- If evidence is insufficient, state exactly what information is missing.
- Never infer, extrapolate, or generalize beyond the evidence.";

pub const ANSWER_GENERATION_PROMPT: &str = "Question: {query}

Evidence:
{evidence_block}

{decomposition_context}

Provide a clear, well-cited answer based on the evidence above.";

pub const QUERY_DECOMPOSITION_PROMPT: &str = "Break the following complex question into simpler, independent sub-questions that can be answered individually.
Return a JSON object with:
- \"sub_questions\": list of simple questions (max 5)
- \"synthesis_instruction\": how to combine the sub-answers into a final answer

If the question is already simple, return it as the only sub-question.

Question: {query}";

pub const GROUNDEDNESS_CHECK_PROMPT: &str = "Evaluate how well the following answer is grounded in the provided evidence.

Answer: {answer}

Evidence:
{evidence_block}

For each claim in the answer, determine if it is directly supported by the evidence.
Return a JSON object:
- \"score\": float between 0.0 (not grounded) and 1.0 (fully grounded)
- \"unsupported_claims\": list of claims not supported by evidence";

pub const ANSWER_CONTRADICTION_PROMPT: &str = "Does the following answer contradict any of the evidence?

Answer: {answer}

Evidence:
{evidence_block}

Return a JSON object:
- \"contradictions\": list of {\"claim\": str, \"evidence_num\": int, \"description\": str}
- \"contradiction_rate\": float between 0.0 and 1.0";

pub const SELF_CONSISTENCY_PROMPT: &str = "Answer the following question briefly and directly based on the evidence.

Question: {query}

Evidence:
{evidence_block}

Provide a concise answer (1-3 sentences).";

/// Most chunks a prompt's evidence block carries.
pub const MAX_EVIDENCE_CHUNKS: usize = 10;

/// Number a candidate list into an evidence block: `[1] ...`, `[2] ...`.
pub fn format_evidence_block(candidates: &[RetrievalCandidate]) -> String {
    candidates
        .iter()
        .take(MAX_EVIDENCE_CHUNKS)
        .enumerate()
        .map(|(i, c)| format!("[{}] {}", i + 1, c.chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Same numbering for bare chunks (verifier prompts).
pub fn format_chunk_evidence_block(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .take(MAX_EVIDENCE_CHUNKS)
        .enumerate()
        .map(|(i, c)| format!("[{}] {}", i + 1, c.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Render the decomposition plan for the generation prompt. Empty unless the
/// query actually split.
pub fn format_decomposition_context(sub_questions: &[String], synthesis: &str) -> String {
    if sub_questions.len() <= 1 {
        return String::new();
    }
    let mut lines = vec!["Consider these aspects:".to_string()];
    for (i, sq) in sub_questions.iter().enumerate() {
        lines.push(format!("  {}. {}", i + 1, sq));
    }
    if !synthesis.is_empty() {
        lines.push(format!("\nSynthesis approach: {synthesis}"));
    }
    lines.join("\n")
}
