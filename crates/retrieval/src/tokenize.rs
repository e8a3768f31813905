//! Text preprocessing for lexical search.

use std::collections::HashSet;

use once_cell::sync::Lazy;

/// English stopwords dropped from both indexed text and queries.
static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can", "could", "did",
        "do", "does", "for", "from", "had", "has", "have", "how", "i", "if", "in", "into", "is",
        "it", "its", "may", "might", "must", "no", "not", "of", "on", "or", "our", "shall",
        "should", "so", "such", "than", "that", "the", "their", "them", "then", "there", "these",
        "they", "this", "those", "to", "was", "we", "were", "what", "when", "where", "which",
        "who", "whom", "why", "will", "with", "would", "you", "your",
    ]
    .into_iter()
    .collect()
});

/// Tokenize text for BM25: lowercase, strip non-word characters, split on
/// whitespace, drop stopwords and single-character tokens.
///
/// Idempotent on already-tokenized lowercase words; never introduces
/// characters absent from the input.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|t| t.chars().count() > 1 && !STOPWORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_tokenization() {
        let tokens = tokenize("What does RAG do to reduce hallucination?");
        assert_eq!(tokens, vec!["rag", "reduce", "hallucination"]);
    }

    #[test]
    fn test_empty_and_stopword_only() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("the of and to").is_empty());
    }

    #[test]
    fn test_punctuation_stripped() {
        let tokens = tokenize("vector-search, embeddings; rerank.");
        assert_eq!(tokens, vec!["vector", "search", "embeddings", "rerank"]);
    }

    #[test]
    fn test_idempotent() {
        let first = tokenize("hybrid retrieval quality scoring");
        let rejoined = first.join(" ");
        assert_eq!(tokenize(&rejoined), first);
    }

    #[test]
    fn test_single_chars_dropped() {
        assert!(tokenize("a b c x y z").is_empty());
    }
}
