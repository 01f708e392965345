//! Vector nearest-neighbour search

use crate::embedding::{EmbeddingProvider, VectorIndex};
use crate::retrieval::{SearchError, SearchHit, SearchPath};
use crate::storage::{Cancellation, ChunkStore};
use ahash::AHashMap;
use std::sync::Arc;
use tracing::debug;

/// Embeds the query and looks up its nearest chunks
pub struct VectorSearcher {
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
    store: Arc<dyn ChunkStore>,
    /// Over-fetch factor when results are filtered to one document
    filter_multiplier: usize,
}

impl VectorSearcher {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        index: Arc<VectorIndex>,
        store: Arc<dyn ChunkStore>,
        filter_multiplier: usize,
    ) -> Self {
        Self {
            provider,
            index,
            store,
            filter_multiplier: filter_multiplier.max(1),
        }
    }

    /// Up to `n` nearest chunks, closest first, with their cosine distance
    pub async fn search(
        &self,
        query: &str,
        n: usize,
        document_id: Option<i64>,
    ) -> Result<Vec<SearchHit>, SearchError> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let provider = Arc::clone(&self.provider);
        let index = Arc::clone(&self.index);
        let store = Arc::clone(&self.store);
        let query = query.to_string();
        let fetch = match document_id {
            Some(_) => n.saturating_mul(self.filter_multiplier),
            None => n,
        };

        let cancel = Cancellation::new();
        let _cancel_on_drop = cancel.drop_guard();
        let hits = tokio::task::spawn_blocking(move || -> Result<Vec<SearchHit>, SearchError> {
            let embedding = provider
                .embed(&query)
                .map_err(|e| SearchError::EmbeddingError(e.to_string()))?;
            if cancel.is_cancelled() {
                return Err(SearchError::Cancelled);
            }

            let neighbors = index
                .search(&embedding, fetch)
                .map_err(|e| SearchError::VectorSearchError(e.to_string()))?;
            if neighbors.is_empty() {
                return Ok(Vec::new());
            }

            let ids: Vec<i64> = neighbors.iter().map(|neighbor| neighbor.chunk_id).collect();
            let mut chunks: AHashMap<i64, _> = store
                .chunks_by_ids(&ids, &cancel)
                .map_err(SearchError::from_store)?
                .into_iter()
                .map(|c| (c.id, c))
                .collect();

            Ok(neighbors
                .into_iter()
                .filter_map(|neighbor| {
                    let chunk = chunks.remove(&neighbor.chunk_id)?;
                    if document_id.is_some_and(|d| chunk.document_id != d) {
                        return None;
                    }
                    Some(SearchHit::from_chunk(chunk, neighbor.distance, SearchPath::Vector))
                })
                .take(n)
                .collect())
        })
        .await
        .map_err(|e| SearchError::TaskFailed(e.to_string()))??;

        debug!("Vector path: {} hits", hits.len());
        Ok(hits)
    }
}
