// Per-collection vector index
// A flat exact inner-product index over caller-normalized vectors, persisted
// as one snapshot file per collection. The index stores document row ids as
// its join key against the relational store; the two artifacts are reconciled
// explicitly, never transactionally.

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::{Result, SearchError};

const INDEX_FILE_EXTENSION: &str = "vec";

/// On-disk snapshot: declared dimension plus row-major vector data keyed by
/// document id.
#[derive(Debug, Serialize, Deserialize)]
struct IndexSnapshot {
    dim: u32,
    ids: Vec<i64>,
    data: Vec<f32>,
}

#[derive(Debug)]
struct CollectionIndex {
    dim: usize,
    ids: Vec<i64>,
    data: Vec<f32>,
    /// id -> row offset in `data`.
    positions: HashMap<i64, usize>,
}

impl CollectionIndex {
    fn empty(dim: usize) -> Self {
        Self {
            dim,
            ids: Vec::new(),
            data: Vec::new(),
            positions: HashMap::new(),
        }
    }

    fn row(&self, position: usize) -> &[f32] {
        let start = position * self.dim;
        &self.data[start..start + self.dim]
    }

    fn upsert(&mut self, id: i64, vector: &[f32]) {
        match self.positions.get(&id) {
            Some(&position) => {
                let start = position * self.dim;
                self.data[start..start + self.dim].copy_from_slice(vector);
            }
            None => {
                self.positions.insert(id, self.ids.len());
                self.ids.push(id);
                self.data.extend_from_slice(vector);
            }
        }
    }
}

/// Vector store managing one flat index per collection.
#[derive(Debug)]
pub struct VectorStore {
    dir: PathBuf,
    collections: HashMap<String, CollectionIndex>,
}

impl VectorStore {
    /// Create a store rooted at the given snapshot directory.
    #[inline]
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| {
            SearchError::Storage(format!(
                "Failed to create vector index directory {}: {e}",
                dir.display()
            ))
        })?;

        Ok(Self {
            dir,
            collections: HashMap::new(),
        })
    }

    /// Deterministic snapshot path for a collection.
    #[inline]
    pub fn index_path(&self, collection: &str) -> PathBuf {
        self.dir
            .join(format!("{collection}.{INDEX_FILE_EXTENSION}"))
    }

    /// Load a persisted index for the collection, or initialize an empty one
    /// of the declared dimension. Fails when a persisted snapshot's dimension
    /// differs from `dim`.
    #[inline]
    pub fn load_index(&mut self, collection: &str, dim: usize) -> Result<()> {
        if dim == 0 {
            return Err(SearchError::Validation(
                "Embedding dimensionality must be non-zero".to_string(),
            ));
        }

        let path = self.index_path(collection);
        if !path.exists() {
            debug!("No snapshot at {}, initializing empty index", path.display());
            self.collections
                .insert(collection.to_string(), CollectionIndex::empty(dim));
            return Ok(());
        }

        let bytes = std::fs::read(&path).map_err(|e| {
            SearchError::Storage(format!("Failed to read index {}: {e}", path.display()))
        })?;
        let snapshot: IndexSnapshot = bincode::deserialize(&bytes).map_err(|e| {
            SearchError::Storage(format!("Corrupt index snapshot {}: {e}", path.display()))
        })?;

        if snapshot.dim as usize != dim {
            return Err(SearchError::DimensionMismatch {
                expected: dim,
                actual: snapshot.dim as usize,
            });
        }
        if snapshot.data.len() != snapshot.ids.len() * dim {
            return Err(SearchError::Storage(format!(
                "Corrupt index snapshot {}: {} ids but {} values for dimension {}",
                path.display(),
                snapshot.ids.len(),
                snapshot.data.len(),
                dim
            )));
        }

        let positions = snapshot
            .ids
            .iter()
            .enumerate()
            .map(|(position, &id)| (id, position))
            .collect();
        let index = CollectionIndex {
            dim,
            ids: snapshot.ids,
            data: snapshot.data,
            positions,
        };

        info!(
            "Loaded index for '{}': {} vectors of dimension {}",
            collection,
            index.ids.len(),
            dim
        );
        self.collections.insert(collection.to_string(), index);
        Ok(())
    }

    fn index(&self, collection: &str) -> Result<&CollectionIndex> {
        self.collections
            .get(collection)
            .ok_or_else(|| SearchError::NotInitialized(collection.to_string()))
    }

    /// Insert or overwrite vectors keyed by document id. Vectors must be
    /// pre-normalized to unit L2 norm by the caller. The snapshot is flushed
    /// after every add so a crash loses at most the in-flight batch.
    #[inline]
    pub fn add_embeddings(
        &mut self,
        collection: &str,
        doc_ids: &[i64],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        if doc_ids.len() != vectors.len() {
            return Err(SearchError::Validation(format!(
                "{} ids supplied with {} vectors",
                doc_ids.len(),
                vectors.len()
            )));
        }

        let dim = self.index(collection)?.dim;
        for vector in vectors {
            if vector.len() != dim {
                return Err(SearchError::DimensionMismatch {
                    expected: dim,
                    actual: vector.len(),
                });
            }
        }

        let index = self
            .collections
            .get_mut(collection)
            .ok_or_else(|| SearchError::NotInitialized(collection.to_string()))?;
        for (&id, vector) in doc_ids.iter().zip(vectors) {
            index.upsert(id, vector);
        }

        debug!(
            "Indexed {} vectors into '{}' ({} total)",
            doc_ids.len(),
            collection,
            index.ids.len()
        );
        self.flush(collection)
    }

    /// Top-k nearest neighbors by inner product (cosine similarity over
    /// normalized vectors). Ties are stable by insertion order.
    #[inline]
    pub fn search(
        &self,
        collection: &str,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<(i64, f32)>> {
        let index = self.index(collection)?;
        if query.len() != index.dim {
            return Err(SearchError::DimensionMismatch {
                expected: index.dim,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(i64, f32)> = index
            .ids
            .iter()
            .enumerate()
            .map(|(position, &id)| {
                let score: f32 = index
                    .row(position)
                    .iter()
                    .zip(query)
                    .map(|(a, b)| a * b)
                    .sum();
                (id, score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    /// Document ids currently present in a collection's index.
    #[inline]
    pub fn ids(&self, collection: &str) -> Result<Vec<i64>> {
        Ok(self.index(collection)?.ids.clone())
    }

    #[inline]
    pub fn len(&self, collection: &str) -> Result<usize> {
        Ok(self.index(collection)?.ids.len())
    }

    #[inline]
    pub fn is_empty(&self, collection: &str) -> Result<bool> {
        Ok(self.index(collection)?.ids.is_empty())
    }

    /// Drop the given ids from the index, rebuilding the backing storage.
    /// Unknown ids are ignored.
    #[inline]
    pub fn remove(&mut self, collection: &str, doc_ids: &[i64]) -> Result<usize> {
        let index = self
            .collections
            .get_mut(collection)
            .ok_or_else(|| SearchError::NotInitialized(collection.to_string()))?;

        let to_remove: std::collections::HashSet<i64> = doc_ids.iter().copied().collect();
        let before = index.ids.len();
        if before == 0 || to_remove.is_empty() {
            return Ok(0);
        }

        let dim = index.dim;
        let mut rebuilt = CollectionIndex::empty(dim);
        for (position, &id) in index.ids.iter().enumerate() {
            if !to_remove.contains(&id) {
                let start = position * dim;
                rebuilt.positions.insert(id, rebuilt.ids.len());
                rebuilt.ids.push(id);
                rebuilt.data.extend_from_slice(&index.data[start..start + dim]);
            }
        }

        let removed = before - rebuilt.ids.len();
        *index = rebuilt;
        if removed > 0 {
            warn!("Removed {} orphaned vectors from '{}'", removed, collection);
            self.flush(collection)?;
        }
        Ok(removed)
    }

    /// Persist a collection's index snapshot to disk.
    #[inline]
    pub fn flush(&self, collection: &str) -> Result<()> {
        let index = self.index(collection)?;
        let snapshot = IndexSnapshot {
            dim: index.dim as u32,
            ids: index.ids.clone(),
            data: index.data.clone(),
        };

        let bytes = bincode::serialize(&snapshot)
            .map_err(|e| SearchError::Storage(format!("Failed to serialize index: {e}")))?;

        let path = self.index_path(collection);
        let tmp_path = path.with_extension("vec.tmp");
        std::fs::write(&tmp_path, &bytes).map_err(|e| {
            SearchError::Storage(format!("Failed to write index {}: {e}", tmp_path.display()))
        })?;
        std::fs::rename(&tmp_path, &path).map_err(|e| {
            SearchError::Storage(format!("Failed to replace index {}: {e}", path.display()))
        })?;

        debug!(
            "Flushed index for '{}' ({} vectors) to {}",
            collection,
            index.ids.len(),
            path.display()
        );
        Ok(())
    }
}

/// Scale a vector to unit L2 norm in place. Zero vectors are left untouched.
#[inline]
pub fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}
