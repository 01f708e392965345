//! Embedding generation and vector indexing
//!
//! - `EmbeddingProvider` trait with FastEmbed and feature-hashing backends
//! - HNSW vector index (cosine distance) rebuilt from persisted vectors
//! - Batch indexer that embeds newly imported chunks

mod batch;
mod provider;
mod vector_index;

pub use batch::{IndexReport, Indexer};
pub use provider::{
    build_provider, EmbeddingError, EmbeddingProvider, FastEmbedProvider, HashEmbedder,
};
pub use vector_index::{Neighbor, VectorIndex, VectorIndexError};
