//! Chunk metadata, provenance tags and ranked results

use serde::{Deserialize, Serialize};

/// Structural location of a chunk inside its document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub chunk_id: i64,
    pub document_id: i64,
    pub page: u32,
    pub chapter: String,
    pub paragraph: String,
    pub section_title: String,
    pub position: u32,
}

impl ChunkMetadata {
    pub fn key(&self) -> ChunkKey {
        ChunkKey {
            document_id: self.document_id,
            page: self.page,
            position: self.position,
        }
    }
}

/// Identity of a chunk across retrieval paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey {
    pub document_id: i64,
    pub page: u32,
    pub position: u32,
}

/// Which retrieval paths found a ranked result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Lexical,
    Hybrid,
    Vector,
}

impl Provenance {
    /// Tie-break rank among equal scores: lexical before hybrid before vector
    pub fn priority(self) -> u8 {
        match self {
            Provenance::Lexical => 0,
            Provenance::Hybrid => 1,
            Provenance::Vector => 2,
        }
    }
}

/// A merged result with normalized score and provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub content: String,
    pub metadata: ChunkMetadata,
    /// Normalized score in [0, 1], higher is better
    pub score: f32,
    pub provenance: Provenance,
    /// Cosine distance from the vector path, when that path found the chunk
    pub distance: Option<f32>,
}
