//! Post-chunking quality checks.
//!
//! Drops garbage before it reaches the indexes: too-short chunks, chunks
//! dominated by a single repeated token, and exact-text duplicates.

use std::collections::{HashMap, HashSet};

use relia_core::Chunk;

/// Quality gate thresholds.
#[derive(Debug, Clone)]
pub struct QualityThresholds {
    /// Minimum chunk length in characters
    pub min_chars: usize,
    /// Maximum share any single token may hold of the chunk
    pub max_repetition_ratio: f32,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_chars: 20,
            max_repetition_ratio: 0.5,
        }
    }
}

fn is_repetitive(text: &str, max_ratio: f32) -> bool {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() <= 5 {
        return false;
    }
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for token in &tokens {
        *counts.entry(token).or_insert(0) += 1;
    }
    let max_count = counts.values().copied().max().unwrap_or(0);
    max_count as f32 / tokens.len() as f32 > max_ratio
}

/// Apply the quality gate, preserving order. Position indexes are reassigned
/// so they stay dense after drops.
pub fn filter_chunks(chunks: Vec<Chunk>, thresholds: &QualityThresholds) -> Vec<Chunk> {
    let mut seen_texts: HashSet<String> = HashSet::new();
    let before = chunks.len();

    let mut kept: Vec<Chunk> = chunks
        .into_iter()
        .filter(|c| {
            let trimmed = c.text.trim();
            if trimmed.chars().count() < thresholds.min_chars {
                return false;
            }
            if is_repetitive(trimmed, thresholds.max_repetition_ratio) {
                return false;
            }
            seen_texts.insert(trimmed.to_string())
        })
        .collect();

    for (i, chunk) in kept.iter_mut().enumerate() {
        chunk.index = i;
    }

    if kept.len() < before {
        tracing::info!(before, after = kept.len(), "low-quality chunks dropped");
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk::new(id, "doc", text, 0, text.split_whitespace().count())
    }

    #[test]
    fn test_short_chunks_dropped() {
        let kept = filter_chunks(
            vec![chunk("a", "tiny"), chunk("b", "this chunk is long enough to keep")],
            &QualityThresholds::default(),
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].chunk_id, "b");
    }

    #[test]
    fn test_repetitive_chunks_dropped() {
        let spam = "buy buy buy buy buy buy buy buy now";
        let kept = filter_chunks(
            vec![chunk("a", spam), chunk("b", "varied words make a useful retrieval chunk")],
            &QualityThresholds::default(),
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].chunk_id, "b");
    }

    #[test]
    fn test_exact_duplicates_dropped() {
        let text = "identical chunk text appearing more than once";
        let kept = filter_chunks(
            vec![chunk("a", text), chunk("b", text)],
            &QualityThresholds::default(),
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].chunk_id, "a");
    }

    #[test]
    fn test_indexes_reassigned_dense() {
        let kept = filter_chunks(
            vec![
                chunk("a", "x"),
                chunk("b", "first surviving chunk with enough length"),
                chunk("c", "second surviving chunk with enough length"),
            ],
            &QualityThresholds::default(),
        );
        let indexes: Vec<usize> = kept.iter().map(|c| c.index).collect();
        assert_eq!(indexes, vec![0, 1]);
    }
}
