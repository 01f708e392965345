/// Batch indexer: embeds stored chunks and feeds the vector index
use super::{EmbeddingError, EmbeddingProvider, VectorIndex};
use crate::error::{LecternError, Result};
use crate::storage::{Chunk, Database};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of an indexing run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub processed: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// Embeds chunks that have no vector yet for the active model
///
/// Each batch is embedded on the blocking pool, persisted to the
/// `embeddings` table and inserted into the in-memory index.
pub struct Indexer {
    provider: Arc<dyn EmbeddingProvider>,
    vector_index: Arc<VectorIndex>,
    database: Database,
    batch_size: usize,
}

impl Indexer {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        vector_index: Arc<VectorIndex>,
        database: Database,
        batch_size: usize,
    ) -> Self {
        Self {
            provider,
            vector_index,
            database,
            batch_size: batch_size.max(1),
        }
    }

    /// Embed every chunk still missing a vector from the provider's model
    pub async fn index_pending(&self) -> Result<IndexReport> {
        let start = std::time::Instant::now();
        let pending = self
            .database
            .chunks_missing_embeddings(self.provider.model_name())?;

        if pending.is_empty() {
            debug!("No chunks waiting for embeddings");
            return Ok(IndexReport::default());
        }

        info!(
            "Embedding {} chunks with {}",
            pending.len(),
            self.provider.model_name()
        );

        let mut report = IndexReport::default();
        for batch in pending.chunks(self.batch_size) {
            match self.process_batch(batch.to_vec()).await {
                Ok(count) => {
                    report.processed += count;
                    debug!("Embedded batch of {} chunks", count);
                }
                Err(e) => {
                    warn!("Failed to embed batch of {} chunks: {}", batch.len(), e);
                    report.failed += batch.len();
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Indexing complete: {} processed, {} failed, {}ms",
            report.processed, report.failed, report.duration_ms
        );

        Ok(report)
    }

    async fn process_batch(&self, batch: Vec<Chunk>) -> Result<usize> {
        let provider = Arc::clone(&self.provider);
        let index = Arc::clone(&self.vector_index);
        let database = self.database.clone();

        tokio::task::spawn_blocking(move || -> Result<usize> {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embeddings = provider.embed_batch(&texts)?;

            if embeddings.len() != batch.len() {
                return Err(EmbeddingError::GenerationError(format!(
                    "Embedding count mismatch: expected {}, got {}",
                    batch.len(),
                    embeddings.len()
                ))
                .into());
            }

            for (chunk, embedding) in batch.iter().zip(embeddings.iter()) {
                database.store_embedding(chunk.id, embedding, provider.model_name())?;
                index.insert(chunk.id, embedding)?;
            }

            Ok(batch.len())
        })
        .await
        .map_err(|e| LecternError::Other(anyhow::anyhow!("Indexing task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexingConfig;
    use crate::embedding::HashEmbedder;
    use crate::storage::NewChunk;
    use tempfile::TempDir;

    fn indexing() -> IndexingConfig {
        IndexingConfig {
            hnsw_ef_construction: 100,
            hnsw_ef_search: 32,
            hnsw_m: 16,
            max_elements: 1_000,
        }
    }

    #[tokio::test]
    async fn test_index_pending_embeds_once() {
        let temp = TempDir::new().unwrap();
        let database = Database::new(&temp.path().join("db.sqlite")).unwrap();
        let doc = database.insert_document("a.pdf", "/tmp/a.pdf").unwrap();
        let chunks: Vec<NewChunk> = (0..5)
            .map(|i| NewChunk {
                content: format!("Fragment number {} about the Roman Republic", i),
                page_number: 10 + i,
                chapter: String::new(),
                paragraph: String::new(),
                section_title: String::new(),
                position: i,
            })
            .collect();
        database.insert_chunks(doc, &chunks).unwrap();

        let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedder::new(64));
        let index = Arc::new(VectorIndex::new(64, &indexing()));
        let indexer = Indexer::new(provider, Arc::clone(&index), database.clone(), 2);

        let report = indexer.index_pending().await.unwrap();
        assert_eq!(report.processed, 5);
        assert_eq!(report.failed, 0);
        assert_eq!(index.len(), 5);
        assert_eq!(database.stats().unwrap().embedded_count, 5);

        // Second run finds nothing to do
        let again = indexer.index_pending().await.unwrap();
        assert_eq!(again.processed, 0);
        assert_eq!(database.load_embeddings("hash").unwrap().len(), 5);
    }
}
