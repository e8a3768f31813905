//! Content-addressed embedding cache.

use std::collections::HashMap;

use relia_core::Result;
use rusqlite::{params, params_from_iter};
use sha2::{Digest, Sha256};

use crate::schema::EMBEDDING_CACHE_TABLE;
use crate::{open, run_blocking};

/// SQLite-backed embedding cache keyed by a content hash.
///
/// The hash covers a namespace (embedding model + dimensionality) plus the
/// raw text, so switching models implicitly invalidates old entries. `put` is
/// idempotent; there is no TTL.
#[derive(Debug, Clone)]
pub struct EmbeddingCache {
    path: String,
    namespace: String,
}

impl EmbeddingCache {
    /// `namespace` should identify the embedding model and dimensionality,
    /// e.g. `"text-embedding-3-small:1536"`.
    pub fn new(path: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            namespace: namespace.into(),
        }
    }

    pub async fn initialize(&self) -> Result<()> {
        let path = self.path.clone();
        run_blocking(move || {
            let conn = open(&path)?;
            conn.execute(EMBEDDING_CACHE_TABLE, [])?;
            Ok(())
        })
        .await
    }

    fn content_hash(&self, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.namespace.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Look up one text. `None` on miss.
    pub async fn get(&self, text: &str) -> Result<Option<Vec<f32>>> {
        let path = self.path.clone();
        let hash = self.content_hash(text);
        run_blocking(move || {
            let conn = open(&path)?;
            let mut stmt =
                conn.prepare("SELECT embedding FROM embedding_cache WHERE text_hash = ?1")?;
            let raw: Option<String> = stmt
                .query_row(params![hash], |row| row.get(0))
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;
            Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
        })
        .await
    }

    /// Batched lookup. Returns `{input index: embedding}` for cached texts.
    pub async fn get_batch(&self, texts: &[String]) -> Result<HashMap<usize, Vec<f32>>> {
        if texts.is_empty() {
            return Ok(HashMap::new());
        }
        let path = self.path.clone();
        let hashes: Vec<String> = texts.iter().map(|t| self.content_hash(t)).collect();
        run_blocking(move || {
            let hash_to_idx: HashMap<&str, usize> = hashes
                .iter()
                .enumerate()
                .map(|(i, h)| (h.as_str(), i))
                .collect();

            let conn = open(&path)?;
            let placeholders = vec!["?"; hashes.len()].join(",");
            let sql = format!(
                "SELECT text_hash, embedding FROM embedding_cache WHERE text_hash IN ({placeholders})"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(hashes.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut result = HashMap::new();
            for row in rows {
                let (hash, raw) = row?;
                if let (Some(&idx), Ok(embedding)) =
                    (hash_to_idx.get(hash.as_str()), serde_json::from_str(&raw))
                {
                    result.insert(idx, embedding);
                }
            }
            Ok(result)
        })
        .await
    }

    /// Store one embedding. Overwrites any previous entry for the same text.
    pub async fn put(&self, text: &str, embedding: &[f32]) -> Result<()> {
        self.put_batch(std::slice::from_ref(&text.to_string()), &[embedding.to_vec()])
            .await
    }

    /// Store a batch of embeddings, parallel to `texts`.
    pub async fn put_batch(&self, texts: &[String], embeddings: &[Vec<f32>]) -> Result<()> {
        if texts.is_empty() {
            return Ok(());
        }
        let path = self.path.clone();
        let rows: Vec<(String, String)> = texts
            .iter()
            .zip(embeddings.iter())
            .map(|(t, e)| {
                (
                    self.content_hash(t),
                    serde_json::to_string(e).unwrap_or_else(|_| "[]".to_string()),
                )
            })
            .collect();
        run_blocking(move || {
            let mut conn = open(&path)?;
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR REPLACE INTO embedding_cache (text_hash, embedding) \
                     VALUES (?1, ?2)",
                )?;
                for (hash, raw) in &rows {
                    stmt.execute(params![hash, raw])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
