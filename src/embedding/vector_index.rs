/// HNSW vector index for nearest-neighbour search over chunk embeddings
use crate::config::IndexingConfig;
use hnsw_rs::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Maximum number of HNSW layers
const MAX_LAYERS: usize = 16;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

/// One nearest neighbour
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub chunk_id: i64,
    /// Cosine distance, `1 - cos(query, vector)`; lower is closer
    pub distance: f32,
}

/// HNSW vector index wrapper
///
/// The index lives in memory; vectors are persisted in the `embeddings`
/// table and replayed through [`VectorIndex::from_embeddings`] at start-up.
pub struct VectorIndex {
    index: Hnsw<'static, f32, DistCosine>,
    dimension: usize,
    ef_search: usize,
    count: AtomicUsize,
}

impl VectorIndex {
    /// Create an empty index for vectors of `dimension`
    pub fn new(dimension: usize, config: &IndexingConfig) -> Self {
        let index = Hnsw::<f32, DistCosine>::new(
            config.hnsw_m,
            config.max_elements,
            MAX_LAYERS,
            config.hnsw_ef_construction,
            DistCosine {},
        );

        Self {
            index,
            dimension,
            ef_search: config.hnsw_ef_search,
            count: AtomicUsize::new(0),
        }
    }

    /// Rebuild an index from persisted `(chunk id, vector)` pairs
    ///
    /// Vectors of the wrong dimension (left over from another model) are skipped.
    pub fn from_embeddings(
        dimension: usize,
        config: &IndexingConfig,
        embeddings: &[(i64, Vec<f32>)],
    ) -> Self {
        let index = Self::new(dimension, config);
        let mut skipped = 0usize;

        for (chunk_id, vector) in embeddings {
            if index.insert(*chunk_id, vector).is_err() {
                skipped += 1;
            }
        }

        if skipped > 0 {
            tracing::warn!(
                "Skipped {} stored embeddings with unexpected dimension",
                skipped
            );
        }
        tracing::info!("Vector index loaded with {} vectors", index.len());

        index
    }

    /// Insert a chunk's vector
    pub fn insert(&self, chunk_id: i64, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        let id = usize::try_from(chunk_id)
            .map_err(|_| VectorIndexError::InsertError(format!("Invalid chunk id {}", chunk_id)))?;

        self.index.insert((vector, id));
        self.count.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    /// Search for the `k` nearest neighbours, closest first
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, VectorIndexError> {
        if query.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let ef = self.ef_search.max(k);
        let mut neighbors: Vec<Neighbor> = self
            .index
            .search(query, k, ef)
            .into_iter()
            .map(|n| Neighbor {
                chunk_id: n.d_id as i64,
                distance: n.distance,
            })
            .collect();

        if neighbors.iter().any(|n| n.distance.is_nan()) {
            return Err(VectorIndexError::SearchError(
                "Distance is NaN; zero vector in index or query".to_string(),
            ));
        }
        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        Ok(neighbors)
    }

    /// Number of vectors in the index
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> IndexingConfig {
        IndexingConfig {
            hnsw_ef_construction: 200,
            hnsw_ef_search: 64,
            hnsw_m: 16,
            max_elements: 1_000,
        }
    }

    fn unit(dim: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[hot] = 1.0;
        v
    }

    #[test]
    fn test_index_creation() {
        let index = VectorIndex::new(8, &config());
        assert_eq!(index.dimension(), 8);
        assert_eq!(index.len(), 0);
        assert!(index.is_empty());
        assert!(index.search(&unit(8, 0), 5).unwrap().is_empty());
    }

    #[test]
    fn test_insert_and_search() {
        let index = VectorIndex::new(8, &config());

        let mut close = vec![0.0; 8];
        close[0] = 0.9;
        close[1] = 0.1;

        index.insert(1, &unit(8, 0)).unwrap();
        index.insert(2, &unit(8, 1)).unwrap();
        index.insert(3, &close).unwrap();
        assert_eq!(index.len(), 3);

        let results = index.search(&unit(8, 0), 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_id, 1);
        assert!(results[0].distance < 1e-4);
        assert_eq!(results[1].chunk_id, 3);
        assert!(results[0].distance <= results[1].distance);
    }

    #[test]
    fn test_dimension_validation() {
        let index = VectorIndex::new(8, &config());
        assert!(matches!(
            index.insert(1, &[1.0; 4]),
            Err(VectorIndexError::InvalidDimension { .. })
        ));
        assert!(index.search(&[1.0; 4], 3).is_err());
    }

    #[test]
    fn test_from_embeddings_skips_foreign_dimensions() {
        let stored = vec![(1, unit(8, 0)), (2, vec![1.0; 4]), (3, unit(8, 2))];
        let index = VectorIndex::from_embeddings(8, &config(), &stored);
        assert_eq!(index.len(), 2);
    }
}
