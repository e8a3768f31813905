//! Cross-encoder capability.

use async_trait::async_trait;

use crate::Result;

/// Cross-encoder relevance scorer.
///
/// Jointly scores (query, passage) pairs. Model inference is synchronous
/// compute; implementations must offload it (e.g. `spawn_blocking`) so the
/// async scheduler is never blocked.
#[async_trait]
pub trait CrossEncoder: Send + Sync + 'static {
    /// Score each passage against the query. Returns one score per passage,
    /// in input order. Higher is more relevant; the range is model-specific.
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>>;

    /// Model identifier for logging.
    fn model_name(&self) -> &str;
}
