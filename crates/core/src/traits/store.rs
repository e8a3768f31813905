//! Storage capabilities.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::{Chunk, Document};
use crate::trace::Trace;
use crate::Result;

/// Document and chunk persistence.
///
/// Reads may run concurrently; writes happen at ingest time and are
/// serialized by the implementation.
#[async_trait]
pub trait ChunkStore: Send + Sync + 'static {
    /// Persist a document record.
    async fn save_document(&self, doc: &Document) -> Result<()>;

    /// Persist a batch of chunks.
    async fn save_chunks(&self, chunks: &[Chunk]) -> Result<()>;

    /// Batched chunk lookup. Missing ids are silently absent from the map.
    async fn get_chunks(&self, chunk_ids: &[String]) -> Result<HashMap<String, Chunk>>;

    /// All chunks, ordered by document and position. Used for index rebuilds.
    async fn all_chunks(&self) -> Result<Vec<Chunk>>;

    async fn count_documents(&self) -> Result<u64>;

    async fn count_chunks(&self) -> Result<u64>;
}

/// Append-only trace persistence. Reads are diagnostic only.
#[async_trait]
pub trait TraceStore: Send + Sync + 'static {
    async fn save_trace(&self, trace: &Trace) -> Result<()>;

    async fn recent_traces(&self, limit: usize) -> Result<Vec<Trace>>;
}
