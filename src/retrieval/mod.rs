//! Hybrid retrieval and ranking
//!
//! Lexical containment search and vector nearest-neighbour search run side by
//! side; [`HybridRanker`] deduplicates their hits and produces the final top-K.
//! [`QueryExpander`] optionally widens the vector path with paraphrases.

mod deduplication;
mod expansion;
mod hybrid;
mod lexical;
mod provenance;
mod vector;

pub use deduplication::{deduplicate_hits, pool_vector_hits};
pub use expansion::{parse_variants, QueryExpander};
pub use hybrid::HybridRanker;
pub use lexical::LexicalSearcher;
pub use provenance::{ChunkKey, ChunkMetadata, Provenance, RankedResult};
pub use vector::VectorSearcher;

use crate::error::LecternError;
use crate::storage::Chunk;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Embedding generation failed: {0}")]
    EmbeddingError(String),

    #[error("Vector search failed: {0}")]
    VectorSearchError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Search timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Search task failed: {0}")]
    TaskFailed(String),

    #[error("Search cancelled")]
    Cancelled,
}

impl SearchError {
    /// Map a store failure, keeping cancellation distinct from real errors
    pub fn from_store(err: LecternError) -> Self {
        match err {
            LecternError::Cancelled => SearchError::Cancelled,
            other => SearchError::DatabaseError(other.to_string()),
        }
    }
}

/// Which retrieval path produced a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPath {
    Lexical,
    Vector,
}

/// Result of one retrieval path, alive for a single query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub content: String,
    pub metadata: ChunkMetadata,
    /// Term-overlap score for lexical hits, cosine distance for vector hits
    pub raw_score: f32,
    pub path: SearchPath,
}

impl SearchHit {
    pub fn from_chunk(chunk: Chunk, raw_score: f32, path: SearchPath) -> Self {
        let metadata = chunk.metadata();
        Self {
            content: chunk.content,
            metadata,
            raw_score,
            path,
        }
    }

    pub fn key(&self) -> ChunkKey {
        self.metadata.key()
    }
}
