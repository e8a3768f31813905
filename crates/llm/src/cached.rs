//! Caching wrapper around any embedder.

use std::sync::Arc;

use async_trait::async_trait;
use relia_core::{Embedder, Result};
use relia_storage::EmbeddingCache;

/// Checks the content-addressed cache first, calls the delegate for misses,
/// and writes new embeddings back. Cache hits return vectors bit-identical to
/// what the delegate produced for the same text.
#[derive(Clone)]
pub struct CachedEmbedder {
    delegate: Arc<dyn Embedder>,
    cache: EmbeddingCache,
}

impl CachedEmbedder {
    pub fn new(delegate: Arc<dyn Embedder>, cache: EmbeddingCache) -> Self {
        Self { delegate, cache }
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.cache.get(text).await? {
            tracing::debug!(query_len = text.len(), "embedding cache hit");
            return Ok(cached);
        }

        let embedding = self.delegate.embed_query(text).await?;
        self.cache.put(text, &embedding).await?;
        Ok(embedding)
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let cached = self.cache.get_batch(texts).await?;

        let miss_indices: Vec<usize> =
            (0..texts.len()).filter(|i| !cached.contains_key(i)).collect();

        if miss_indices.is_empty() {
            tracing::debug!(count = texts.len(), "all embeddings cached");
            let mut result = Vec::with_capacity(texts.len());
            for i in 0..texts.len() {
                result.push(cached[&i].clone());
            }
            return Ok(result);
        }

        let miss_texts: Vec<String> = miss_indices.iter().map(|&i| texts[i].clone()).collect();
        let miss_embeddings = self.delegate.embed_texts(&miss_texts).await?;
        self.cache.put_batch(&miss_texts, &miss_embeddings).await?;

        let mut result: Vec<Vec<f32>> = vec![Vec::new(); texts.len()];
        for (i, embedding) in cached {
            result[i] = embedding;
        }
        for (&i, embedding) in miss_indices.iter().zip(miss_embeddings) {
            result[i] = embedding;
        }

        tracing::debug!(
            total = texts.len(),
            misses = miss_indices.len(),
            "embedded with cache"
        );
        Ok(result)
    }

    fn dimensions(&self) -> usize {
        self.delegate.dimensions()
    }
}
