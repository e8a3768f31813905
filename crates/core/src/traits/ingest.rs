//! Ingest-side capabilities: parsing and chunking.

use std::collections::HashMap;

use crate::domain::Chunk;
use crate::Result;

/// Converts raw file bytes into plain text.
///
/// Parsers are registered by file extension; the registry picks one per
/// uploaded file.
pub trait DocumentParser: Send + Sync + 'static {
    /// File extensions (lowercase, without the dot) this parser handles.
    fn extensions(&self) -> &[&'static str];

    /// Extract plain text from raw bytes.
    fn parse(&self, bytes: &[u8]) -> Result<String>;
}

/// Splits parsed text into retrieval chunks.
pub trait Chunker: Send + Sync + 'static {
    /// Chunk `text` for the document `doc_id`, attaching `metadata` to each
    /// produced chunk. Chunks carry their position index within the document.
    fn chunk(
        &self,
        doc_id: &str,
        text: &str,
        metadata: &HashMap<String, serde_json::Value>,
    ) -> Result<Vec<Chunk>>;
}
