//! Hash-based fallback embedder.
//!
//! Deterministic pseudo-embeddings for environments without an embedding
//! provider (tests, demos, offline runs). Similarity reflects lexical
//! overlap, not semantics.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use relia_core::{Embedder, Result};

/// Deterministic lexical embedder.
///
/// Combines word-level hashing (vocabulary signal) with character trigram
/// hashing (fuzzy-match signal) and normalizes to unit length, so
/// inner-product search behaves like cosine similarity.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn hash_str(s: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        s.hash(&mut hasher);
        hasher.finish()
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];

        let normalized: String = text
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c.is_whitespace() {
                    c.to_ascii_lowercase()
                } else {
                    ' '
                }
            })
            .collect();

        for word in normalized.split_whitespace() {
            let hash = Self::hash_str(word);
            let idx = (hash as usize) % self.dimensions;
            let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            let magnitude = 1.0 + ((hash >> 16) & 0xFF) as f32 / 255.0;
            embedding[idx] += sign * magnitude;
        }

        let chars: Vec<char> = normalized.chars().collect();
        if chars.len() >= 3 {
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                let hash = Self::hash_str(&trigram);
                let idx = (hash as usize) % self.dimensions;
                let sign = if (hash >> 32) & 1 == 0 { 0.5 } else { -0.5 };
                embedding[idx] += sign;
            }
        }

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut embedding {
                *value /= magnitude;
            }
        }

        embedding
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_deterministic() {
        let embedder = HashEmbedder::new(256);
        let a = embedder.embed_query("hello world").await.unwrap();
        let b = embedder.embed_query("hello world").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 256);
    }

    #[tokio::test]
    async fn test_unit_norm() {
        let embedder = HashEmbedder::new(128);
        let v = embedder.embed_query("some text here").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_overlap_scores_higher_than_disjoint() {
        let embedder = HashEmbedder::new(512);
        let base = embedder.embed_query("retrieval augmented generation").await.unwrap();
        let close = embedder
            .embed_query("retrieval augmented generation pipeline")
            .await
            .unwrap();
        let far = embedder.embed_query("pasta carbonara recipe").await.unwrap();
        assert!(dot(&base, &close) > dot(&base, &far));
    }

    #[tokio::test]
    async fn test_empty_text() {
        let embedder = HashEmbedder::new(64);
        let v = embedder.embed_query("").await.unwrap();
        assert_eq!(v.len(), 64);
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
