//! Ingestion pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use relia_core::{
    Chunk, ChunkStore, Chunker, Document, Embedder, Error, IngestResponse, Result,
};
use relia_retrieval::{Bm25Index, VectorIndex};
use uuid::Uuid;

use crate::parser::ParserRegistry;
use crate::quality::{filter_chunks, QualityThresholds};

/// Wires parse -> chunk -> filter -> embed -> index -> store.
pub struct IngestionPipeline {
    registry: ParserRegistry,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn Embedder>,
    chunk_store: Arc<dyn ChunkStore>,
    vector_index: Arc<VectorIndex>,
    bm25_index: Arc<Bm25Index>,
    thresholds: QualityThresholds,
}

impl IngestionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: ParserRegistry,
        chunker: Arc<dyn Chunker>,
        embedder: Arc<dyn Embedder>,
        chunk_store: Arc<dyn ChunkStore>,
        vector_index: Arc<VectorIndex>,
        bm25_index: Arc<Bm25Index>,
        thresholds: QualityThresholds,
    ) -> Self {
        Self {
            registry,
            chunker,
            embedder,
            chunk_store,
            vector_index,
            bm25_index,
            thresholds,
        }
    }

    /// Ingest one uploaded file. Returns the new document id and how many
    /// chunks survived the quality gate.
    pub async fn ingest_bytes(
        &self,
        filename: &str,
        bytes: &[u8],
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<IngestResponse> {
        let parser = self.registry.for_filename(filename)?;
        let text = parser.parse(bytes)?;
        if text.trim().is_empty() {
            return Err(Error::Ingestion(format!(
                "no text extracted from '{filename}'"
            )));
        }

        let doc_id = Uuid::new_v4().to_string();
        let document = Document {
            doc_id: doc_id.clone(),
            source: filename.to_string(),
            content_type: content_type_for(filename),
            metadata: metadata.clone(),
            raw_text: text.clone(),
            created_at: Utc::now(),
        };

        let chunks = self.chunker.chunk(&doc_id, &text, &metadata)?;
        let chunks = filter_chunks(chunks, &self.thresholds);
        if chunks.is_empty() {
            return Err(Error::Ingestion(format!(
                "no usable chunks produced from '{filename}'"
            )));
        }

        self.index_chunks(&chunks).await?;
        self.chunk_store.save_document(&document).await?;
        self.chunk_store.save_chunks(&chunks).await?;

        // Lexical index covers the whole corpus; rebuild from the store so
        // earlier documents stay searchable.
        let all_chunks = self.chunk_store.all_chunks().await?;
        self.bm25_index.rebuild(all_chunks).await?;

        tracing::info!(doc_id = %doc_id, chunks = chunks.len(), source = filename, "document ingested");
        Ok(IngestResponse {
            doc_id,
            chunks_created: chunks.len(),
            status: "ok".to_string(),
        })
    }

    async fn index_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_texts(&texts).await?;
        let ids: Vec<String> = chunks.iter().map(|c| c.chunk_id.clone()).collect();
        self.vector_index.add(ids, embeddings).await
    }
}

fn content_type_for(filename: &str) -> String {
    let extension = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "md" | "markdown" => "text/markdown",
        "html" | "htm" => "text/html",
        _ => "text/plain",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::{ChunkingOptions, StructureChunker};
    use async_trait::async_trait;
    use parking_lot::RwLock;

    #[derive(Default)]
    struct MapStore {
        chunks: RwLock<HashMap<String, Chunk>>,
        docs: RwLock<Vec<Document>>,
    }

    #[async_trait]
    impl ChunkStore for MapStore {
        async fn save_document(&self, doc: &Document) -> Result<()> {
            self.docs.write().push(doc.clone());
            Ok(())
        }
        async fn save_chunks(&self, chunks: &[Chunk]) -> Result<()> {
            let mut map = self.chunks.write();
            for c in chunks {
                map.insert(c.chunk_id.clone(), c.clone());
            }
            Ok(())
        }
        async fn get_chunks(&self, ids: &[String]) -> Result<HashMap<String, Chunk>> {
            let map = self.chunks.read();
            Ok(ids
                .iter()
                .filter_map(|id| map.get(id).map(|c| (id.clone(), c.clone())))
                .collect())
        }
        async fn all_chunks(&self) -> Result<Vec<Chunk>> {
            Ok(self.chunks.read().values().cloned().collect())
        }
        async fn count_documents(&self) -> Result<u64> {
            Ok(self.docs.read().len() as u64)
        }
        async fn count_chunks(&self) -> Result<u64> {
            Ok(self.chunks.read().len() as u64)
        }
    }

    struct TinyEmbedder;

    #[async_trait]
    impl Embedder for TinyEmbedder {
        async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }
        async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
        fn dimensions(&self) -> usize {
            2
        }
    }

    fn pipeline(store: Arc<MapStore>, bm25: Arc<Bm25Index>) -> IngestionPipeline {
        IngestionPipeline::new(
            ParserRegistry::with_defaults(),
            Arc::new(StructureChunker::new(ChunkingOptions {
                max_tokens: 64,
                overlap_pct: 0.1,
            })),
            Arc::new(TinyEmbedder),
            store,
            Arc::new(VectorIndex::new(2)),
            bm25,
            QualityThresholds::default(),
        )
    }

    #[tokio::test]
    async fn test_ingest_markdown_end_to_end() {
        let store = Arc::new(MapStore::default());
        let bm25 = Arc::new(Bm25Index::new());
        let pipeline = pipeline(store.clone(), bm25.clone());

        let body = b"# Retrieval\n\nHybrid retrieval merges lexical and dense recall.\n\n\
                     # Verification\n\nGroundedness checks compare answers with evidence.";
        let response = pipeline
            .ingest_bytes("guide.md", body, HashMap::new())
            .await
            .unwrap();

        assert_eq!(response.status, "ok");
        assert!(response.chunks_created >= 2);
        assert_eq!(store.count_documents().await.unwrap(), 1);
        assert_eq!(
            store.count_chunks().await.unwrap() as usize,
            response.chunks_created
        );
        // Lexical index rebuilt over the new corpus.
        assert!(!bm25.search("groundedness evidence", 5).is_empty());
    }

    #[tokio::test]
    async fn test_ingest_unsupported_extension() {
        let pipeline = pipeline(Arc::new(MapStore::default()), Arc::new(Bm25Index::new()));
        let err = pipeline
            .ingest_bytes("binary.bin", b"xx", HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Ingestion(_)));
    }

    #[tokio::test]
    async fn test_ingest_empty_file_rejected() {
        let pipeline = pipeline(Arc::new(MapStore::default()), Arc::new(Bm25Index::new()));
        let err = pipeline
            .ingest_bytes("empty.txt", b"   ", HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Ingestion(_)));
    }
}
