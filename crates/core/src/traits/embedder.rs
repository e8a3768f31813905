//! Embedding capability.

use async_trait::async_trait;

use crate::Result;

/// Text embedding interface.
///
/// Failures must surface as [`crate::Error::Embedding`] so the pipeline can
/// distinguish them from signal degradation elsewhere.
#[async_trait]
pub trait Embedder: Send + Sync + 'static {
    /// Embed a single query string.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Output vector dimensionality.
    fn dimensions(&self) -> usize;
}
