//! SQLite-backed document and chunk store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relia_core::{Chunk, ChunkStore, Document, Result};
use rusqlite::{params, params_from_iter, Row};

use crate::schema::{CHUNKS_DOC_INDEX, CHUNKS_TABLE, DOCUMENTS_TABLE};
use crate::{open, run_blocking};

/// Chunk store over a single SQLite file.
///
/// Embeddings are not persisted here; chunks loaded from this store carry
/// `embedding: None` and the dense index owns the vectors.
#[derive(Debug, Clone)]
pub struct SqliteChunkStore {
    path: String,
}

impl SqliteChunkStore {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Create tables and indexes if missing.
    pub async fn initialize(&self) -> Result<()> {
        let path = self.path.clone();
        run_blocking(move || {
            let conn = open(&path)?;
            conn.execute(DOCUMENTS_TABLE, [])?;
            conn.execute(CHUNKS_TABLE, [])?;
            conn.execute(CHUNKS_DOC_INDEX, [])?;
            Ok(())
        })
        .await
    }

    fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<Chunk> {
        let metadata: String = row.get("metadata")?;
        Ok(Chunk {
            chunk_id: row.get("chunk_id")?,
            doc_id: row.get("doc_id")?,
            text: row.get("text")?,
            index: row.get::<_, i64>("chunk_index")? as usize,
            metadata: serde_json::from_str(&metadata).unwrap_or_default(),
            token_count: row.get::<_, i64>("token_count")? as usize,
            embedding: None,
        })
    }
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    async fn save_document(&self, doc: &Document) -> Result<()> {
        let path = self.path.clone();
        let doc = doc.clone();
        run_blocking(move || {
            let conn = open(&path)?;
            conn.execute(
                "INSERT OR REPLACE INTO documents \
                 (doc_id, source, content_type, metadata, raw_text, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    doc.doc_id,
                    doc.source,
                    doc.content_type,
                    serde_json::to_string(&doc.metadata).unwrap_or_else(|_| "{}".to_string()),
                    doc.raw_text,
                    doc.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn save_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let path = self.path.clone();
        let count = chunks.len();
        let chunks = chunks.to_vec();
        run_blocking(move || {
            let mut conn = open(&path)?;
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR REPLACE INTO chunks \
                     (chunk_id, doc_id, text, chunk_index, metadata, token_count) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for chunk in &chunks {
                    stmt.execute(params![
                        chunk.chunk_id,
                        chunk.doc_id,
                        chunk.text,
                        chunk.index as i64,
                        serde_json::to_string(&chunk.metadata)
                            .unwrap_or_else(|_| "{}".to_string()),
                        chunk.token_count as i64,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await?;
        tracing::debug!(count, "chunks saved");
        Ok(())
    }

    async fn get_chunks(&self, chunk_ids: &[String]) -> Result<HashMap<String, Chunk>> {
        if chunk_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let path = self.path.clone();
        let ids = chunk_ids.to_vec();
        run_blocking(move || {
            let conn = open(&path)?;
            let placeholders = vec!["?"; ids.len()].join(",");
            let sql = format!("SELECT * FROM chunks WHERE chunk_id IN ({placeholders})");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(ids.iter()), Self::row_to_chunk)?;

            let mut map = HashMap::new();
            for row in rows {
                let chunk = row?;
                map.insert(chunk.chunk_id.clone(), chunk);
            }
            Ok(map)
        })
        .await
    }

    async fn all_chunks(&self) -> Result<Vec<Chunk>> {
        let path = self.path.clone();
        run_blocking(move || {
            let conn = open(&path)?;
            let mut stmt =
                conn.prepare("SELECT * FROM chunks ORDER BY doc_id, chunk_index")?;
            let rows = stmt.query_map([], Self::row_to_chunk)?;
            rows.collect()
        })
        .await
    }

    async fn count_documents(&self) -> Result<u64> {
        let path = self.path.clone();
        run_blocking(move || {
            let conn = open(&path)?;
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0))?;
            Ok(count as u64)
        })
        .await
    }

    async fn count_chunks(&self) -> Result<u64> {
        let path = self.path.clone();
        run_blocking(move || {
            let conn = open(&path)?;
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))?;
            Ok(count as u64)
        })
        .await
    }
}

/// Parse an RFC 3339 timestamp, falling back to the epoch on corrupt rows.
pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, SqliteChunkStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.db");
        (dir, SqliteChunkStore::new(path.to_str().unwrap()))
    }

    fn sample_chunk(id: &str, doc: &str, index: usize) -> Chunk {
        Chunk::new(id, doc, format!("text of {id}"), index, 3)
    }

    #[tokio::test]
    async fn test_save_and_batch_get() {
        let (_dir, store) = test_store();
        store.initialize().await.unwrap();

        let chunks = vec![
            sample_chunk("c1", "d1", 0),
            sample_chunk("c2", "d1", 1),
            sample_chunk("c3", "d2", 0),
        ];
        store.save_chunks(&chunks).await.unwrap();

        let got = store
            .get_chunks(&[
                "c1".to_string(),
                "c3".to_string(),
                "missing".to_string(),
            ])
            .await
            .unwrap();

        // Missing ids are silently absent.
        assert_eq!(got.len(), 2);
        assert_eq!(got["c1"].doc_id, "d1");
        assert_eq!(got["c3"].index, 0);
        assert!(!got.contains_key("missing"));
    }

    #[tokio::test]
    async fn test_counts_and_all_chunks() {
        let (_dir, store) = test_store();
        store.initialize().await.unwrap();

        let doc = Document {
            doc_id: "d1".to_string(),
            source: "notes.md".to_string(),
            content_type: "text/markdown".to_string(),
            metadata: HashMap::new(),
            raw_text: "hello".to_string(),
            created_at: Utc::now(),
        };
        store.save_document(&doc).await.unwrap();
        store
            .save_chunks(&[sample_chunk("c1", "d1", 0), sample_chunk("c2", "d1", 1)])
            .await
            .unwrap();

        assert_eq!(store.count_documents().await.unwrap(), 1);
        assert_eq!(store.count_chunks().await.unwrap(), 2);

        let all = store.all_chunks().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].index, 0);
        assert_eq!(all[1].index, 1);
    }

    #[tokio::test]
    async fn test_save_chunks_is_idempotent() {
        let (_dir, store) = test_store();
        store.initialize().await.unwrap();

        let chunk = sample_chunk("c1", "d1", 0);
        store.save_chunks(&[chunk.clone()]).await.unwrap();
        store.save_chunks(&[chunk]).await.unwrap();

        assert_eq!(store.count_chunks().await.unwrap(), 1);
    }
}
