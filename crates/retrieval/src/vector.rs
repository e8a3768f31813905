//! Dense vector index.
//!
//! Exact inner-product search over L2-normalized vectors (cosine). Chunks are
//! identified externally by string ids, mapped internally to monotonically
//! increasing integers; the mapping persists with the vectors. Writes are
//! serialized via an async mutex; reads search an immutable snapshot without
//! locking.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use rayon::prelude::*;
use relia_core::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
struct VectorInner {
    dimensions: usize,
    /// Row i is the vector for internal id i; empty rows are tombstones.
    vectors: Vec<Vec<f32>>,
    int_to_chunk: Vec<String>,
    chunk_to_int: HashMap<String, usize>,
}

impl VectorInner {
    fn search(&self, query: &[f32], top_k: usize) -> Vec<(String, f32)> {
        if self.vectors.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let query = normalize(query.to_vec());

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .par_iter()
            .enumerate()
            .filter(|(_, v)| !v.is_empty())
            .map(|(idx, v)| (idx, dot(&query, v)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(top_k.min(self.size()));

        scored
            .into_iter()
            .map(|(idx, score)| (self.int_to_chunk[idx].clone(), score))
            .collect()
    }

    fn size(&self) -> usize {
        self.vectors.iter().filter(|v| !v.is_empty()).count()
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[derive(Serialize, Deserialize)]
struct VectorSnapshot {
    dimensions: usize,
    vectors: Vec<Vec<f32>>,
    int_to_chunk: Vec<String>,
}

/// Dense index with external string ids.
pub struct VectorIndex {
    inner: RwLock<Arc<VectorInner>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl VectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            inner: RwLock::new(Arc::new(VectorInner {
                dimensions,
                ..Default::default()
            })),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Construct from a snapshot file if one exists and matches `dimensions`.
    pub fn load_or_new(path: impl AsRef<Path>, dimensions: usize) -> Self {
        let index = Self::new(dimensions);
        let path = path.as_ref();
        if path.exists() {
            let snapshot = std::fs::read_to_string(path)
                .ok()
                .and_then(|raw| serde_json::from_str::<VectorSnapshot>(&raw).ok());
            match snapshot {
                Some(s) if s.dimensions == dimensions => {
                    let chunk_to_int = s
                        .int_to_chunk
                        .iter()
                        .enumerate()
                        .map(|(i, id)| (id.clone(), i))
                        .collect();
                    let inner = VectorInner {
                        dimensions,
                        vectors: s.vectors,
                        int_to_chunk: s.int_to_chunk,
                        chunk_to_int,
                    };
                    tracing::info!(size = inner.size(), path = %path.display(), "vector index loaded");
                    *index.inner.write() = Arc::new(inner);
                }
                Some(s) => tracing::warn!(
                    expected = dimensions,
                    found = s.dimensions,
                    "vector snapshot dimension mismatch, starting empty"
                ),
                None => tracing::warn!(path = %path.display(), "vector snapshot unreadable, starting empty"),
            }
        }
        index
    }

    /// Add (or replace) vectors for the given chunk ids. Vectors are
    /// L2-normalized before insertion.
    pub async fn add(&self, chunk_ids: Vec<String>, vectors: Vec<Vec<f32>>) -> Result<()> {
        if chunk_ids.is_empty() {
            return Ok(());
        }
        if chunk_ids.len() != vectors.len() {
            return Err(Error::Retrieval(format!(
                "id/vector count mismatch: {} vs {}",
                chunk_ids.len(),
                vectors.len()
            )));
        }

        let _guard = self.write_lock.lock().await;
        let snapshot = self.inner.read().clone();
        let count = chunk_ids.len();

        let built = tokio::task::spawn_blocking(move || {
            let mut vectors_new = snapshot.vectors.clone();
            let mut int_to_chunk = snapshot.int_to_chunk.clone();
            let mut chunk_to_int = snapshot.chunk_to_int.clone();

            for (chunk_id, vector) in chunk_ids.into_iter().zip(vectors) {
                if vector.len() != snapshot.dimensions {
                    return Err(Error::Retrieval(format!(
                        "vector dimension {} does not match index dimension {}",
                        vector.len(),
                        snapshot.dimensions
                    )));
                }
                let vector = normalize(vector);
                match chunk_to_int.get(&chunk_id) {
                    Some(&int_id) => vectors_new[int_id] = vector,
                    None => {
                        let int_id = int_to_chunk.len();
                        int_to_chunk.push(chunk_id.clone());
                        chunk_to_int.insert(chunk_id, int_id);
                        vectors_new.push(vector);
                    }
                }
            }

            Ok(VectorInner {
                dimensions: snapshot.dimensions,
                vectors: vectors_new,
                int_to_chunk,
                chunk_to_int,
            })
        })
        .await
        .map_err(|e| Error::TaskJoin(e.to_string()))??;

        let total = built.size();
        *self.inner.write() = Arc::new(built);
        tracing::debug!(count, total, "vectors added");
        Ok(())
    }

    /// Search the current snapshot. The query is normalized; at most
    /// `min(top_k, size)` results come back, best first.
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<(String, f32)> {
        let snapshot = self.inner.read().clone();
        snapshot.search(query, top_k)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = {
            let inner = self.inner.read().clone();
            VectorSnapshot {
                dimensions: inner.dimensions,
                vectors: inner.vectors.clone(),
                int_to_chunk: inner.int_to_chunk.clone(),
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
        tracing::info!(path = %path.display(), "vector index saved");
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.inner.read().size()
    }

    pub fn dimensions(&self) -> usize {
        self.inner.read().dimensions
    }
}
