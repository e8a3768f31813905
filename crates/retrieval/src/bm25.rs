//! BM25 lexical index.
//!
//! Okapi BM25 over the tokenized corpus. Rebuilds construct a fresh inner
//! index off to the side and swap a single reference, so readers observe
//! either the old or the new index, never a partial one.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use relia_core::{Chunk, Error, Result};
use serde::{Deserialize, Serialize};

use crate::tokenize::tokenize;

const K1: f32 = 1.5;
const B: f32 = 0.75;

/// Immutable index snapshot shared with readers.
#[derive(Debug, Default)]
struct Bm25Inner {
    chunk_ids: Vec<String>,
    tokenized_corpus: Vec<Vec<String>>,
    /// token -> [(doc index, term frequency)]
    postings: HashMap<String, Vec<(usize, u32)>>,
    doc_lengths: Vec<u32>,
    avg_doc_length: f32,
}

impl Bm25Inner {
    fn build(chunk_ids: Vec<String>, tokenized_corpus: Vec<Vec<String>>) -> Self {
        let mut postings: HashMap<String, Vec<(usize, u32)>> = HashMap::new();
        let mut doc_lengths = Vec::with_capacity(tokenized_corpus.len());

        for (doc_idx, tokens) in tokenized_corpus.iter().enumerate() {
            doc_lengths.push(tokens.len() as u32);
            let mut tf: HashMap<&str, u32> = HashMap::new();
            for token in tokens {
                *tf.entry(token.as_str()).or_insert(0) += 1;
            }
            for (token, count) in tf {
                postings
                    .entry(token.to_string())
                    .or_default()
                    .push((doc_idx, count));
            }
        }

        let total: u64 = doc_lengths.iter().map(|&l| u64::from(l)).sum();
        let avg_doc_length = if doc_lengths.is_empty() {
            0.0
        } else {
            total as f32 / doc_lengths.len() as f32
        };

        Self {
            chunk_ids,
            tokenized_corpus,
            postings,
            doc_lengths,
            avg_doc_length,
        }
    }

    fn search(&self, query: &str, top_k: usize) -> Vec<(String, f32)> {
        if self.chunk_ids.is_empty() {
            return Vec::new();
        }
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let n = self.chunk_ids.len() as f32;
        let mut scores: HashMap<usize, f32> = HashMap::new();

        for token in &query_tokens {
            let Some(posting) = self.postings.get(token) else {
                continue;
            };
            let df = posting.len() as f32;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
            for &(doc_idx, tf) in posting {
                let tf = tf as f32;
                let dl = self.doc_lengths[doc_idx] as f32;
                let norm = K1 * (1.0 - B + B * dl / self.avg_doc_length.max(1e-6));
                let contribution = idf * (tf * (K1 + 1.0)) / (tf + norm);
                *scores.entry(doc_idx).or_insert(0.0) += contribution;
            }
        }

        let mut ranked: Vec<(usize, f32)> =
            scores.into_iter().filter(|&(_, s)| s > 0.0).collect();
        // Score descending, doc index ascending on ties for a stable order.
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        ranked.truncate(top_k);

        ranked
            .into_iter()
            .map(|(doc_idx, score)| (self.chunk_ids[doc_idx].clone(), score))
            .collect()
    }
}

/// Serialized form: the tokenized corpus and chunk-id vector together.
/// Postings are derived again at load.
#[derive(Serialize, Deserialize)]
struct Bm25Snapshot {
    chunk_ids: Vec<String>,
    tokenized_corpus: Vec<Vec<String>>,
}

/// BM25 index with lock-free reads and serialized rebuilds.
pub struct Bm25Index {
    inner: RwLock<Arc<Bm25Inner>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl Bm25Index {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::new(Bm25Inner::default())),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Construct from a snapshot file if one exists; empty index otherwise.
    pub fn load_or_new(path: impl AsRef<Path>) -> Self {
        let index = Self::new();
        let path = path.as_ref();
        if path.exists() {
            match std::fs::read_to_string(path)
                .ok()
                .and_then(|raw| serde_json::from_str::<Bm25Snapshot>(&raw).ok())
            {
                Some(snapshot) => {
                    let size = snapshot.chunk_ids.len();
                    *index.inner.write() = Arc::new(Bm25Inner::build(
                        snapshot.chunk_ids,
                        snapshot.tokenized_corpus,
                    ));
                    tracing::info!(size, path = %path.display(), "bm25 index loaded");
                }
                None => tracing::warn!(path = %path.display(), "bm25 snapshot unreadable, starting empty"),
            }
        }
        index
    }

    /// Build the index from chunks, replacing any existing contents.
    pub fn build(&self, chunks: &[Chunk]) {
        let chunk_ids: Vec<String> = chunks.iter().map(|c| c.chunk_id.clone()).collect();
        let tokenized: Vec<Vec<String>> = chunks.iter().map(|c| tokenize(&c.text)).collect();
        let size = chunk_ids.len();
        *self.inner.write() = Arc::new(Bm25Inner::build(chunk_ids, tokenized));
        tracing::info!(size, "bm25 index built");
    }

    /// Rebuild off the async scheduler, serialized against other rebuilds.
    /// Readers keep searching the previous snapshot until the swap.
    pub async fn rebuild(&self, chunks: Vec<Chunk>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let built = tokio::task::spawn_blocking(move || {
            let chunk_ids: Vec<String> = chunks.iter().map(|c| c.chunk_id.clone()).collect();
            let tokenized: Vec<Vec<String>> = chunks.iter().map(|c| tokenize(&c.text)).collect();
            Bm25Inner::build(chunk_ids, tokenized)
        })
        .await
        .map_err(|e| Error::TaskJoin(e.to_string()))?;

        let size = built.chunk_ids.len();
        *self.inner.write() = Arc::new(built);
        tracing::info!(size, "bm25 index rebuilt");
        Ok(())
    }

    /// Search the current snapshot. Returns `(chunk_id, score)` with
    /// score > 0 only; an empty tokenized query yields an empty result.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<(String, f32)> {
        let snapshot = self.inner.read().clone();
        snapshot.search(query, top_k)
    }

    /// Persist the tokenized corpus and chunk ids.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = {
            let inner = self.inner.read().clone();
            Bm25Snapshot {
                chunk_ids: inner.chunk_ids.clone(),
                tokenized_corpus: inner.tokenized_corpus.clone(),
            }
        };
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(Error::storage)?;
            }
        }
        let raw = serde_json::to_string(&snapshot).map_err(Error::storage)?;
        std::fs::write(path, raw).map_err(Error::storage)?;
        tracing::info!(size = snapshot.chunk_ids.len(), path = %path.display(), "bm25 index saved");
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.inner.read().chunk_ids.len()
    }
}

impl Default for Bm25Index {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk::new(id, "doc", text, 0, text.split_whitespace().count())
    }

    fn sample_index() -> Bm25Index {
        let index = Bm25Index::new();
        index.build(&[
            chunk("c1", "retrieval augmented generation grounds answers in evidence"),
            chunk("c2", "vector search finds semantically similar passages"),
            chunk("c3", "reranking improves retrieval precision"),
        ]);
        index
    }

    #[test]
    fn test_search_ranks_matching_chunk_first() {
        let index = sample_index();
        let results = index.search("retrieval evidence", 10);
        assert!(!results.is_empty());
        assert_eq!(results[0].0, "c1");
        assert!(results.iter().all(|(_, s)| *s > 0.0));
    }

    #[test]
    fn test_empty_query_and_no_match() {
        let index = sample_index();
        assert!(index.search("", 10).is_empty());
        assert!(index.search("the of and", 10).is_empty());
        assert!(index.search("zebra quantum", 10).is_empty());
    }

    #[test]
    fn test_empty_index() {
        let index = Bm25Index::new();
        assert!(index.search("anything", 10).is_empty());
        assert_eq!(index.size(), 0);
    }

    #[test]
    fn test_build_replaces() {
        let index = sample_index();
        assert_eq!(index.size(), 3);
        index.build(&[chunk("c9", "fresh corpus")]);
        assert_eq!(index.size(), 1);
        assert!(index.search("retrieval", 10).is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_swaps_atomically() {
        let index = sample_index();
        index.rebuild(vec![chunk("n1", "new corpus about llamas")]).await.unwrap();
        assert_eq!(index.size(), 1);
        let results = index.search("llamas", 10);
        assert_eq!(results[0].0, "n1");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bm25.json");

        let index = sample_index();
        index.save(&path).unwrap();

        let loaded = Bm25Index::load_or_new(&path);
        assert_eq!(loaded.size(), 3);
        let results = loaded.search("reranking precision", 10);
        assert_eq!(results[0].0, "c3");
    }

    #[test]
    fn test_top_k_limits() {
        let index = sample_index();
        let results = index.search("retrieval", 1);
        assert_eq!(results.len(), 1);
    }
}
