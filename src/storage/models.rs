//! Corpus records as stored in SQLite

use crate::retrieval::ChunkMetadata;
use serde::{Deserialize, Serialize};

/// Immutable unit of retrievable text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: i64,
    pub document_id: i64,
    pub content: String,
    pub page_number: u32,
    pub chapter: String,
    pub paragraph: String,
    pub section_title: String,
    /// Position within the document, unique per document
    pub position: u32,
    /// Identifier of this chunk's vector in the vector store, once embedded
    pub embedding_id: Option<String>,
}

impl Chunk {
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            chunk_id: self.id,
            document_id: self.document_id,
            page: self.page_number,
            chapter: self.chapter.clone(),
            paragraph: self.paragraph.clone(),
            section_title: self.section_title.clone(),
            position: self.position,
        }
    }
}

/// Chunk supplied by ingestion, before it has a row id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChunk {
    pub content: String,
    #[serde(default = "first_page")]
    pub page_number: u32,
    #[serde(default)]
    pub chapter: String,
    #[serde(default)]
    pub paragraph: String,
    #[serde(default)]
    pub section_title: String,
    pub position: u32,
}

fn first_page() -> u32 {
    1
}

/// Pre-chunked document as accepted by `lectern import`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentImport {
    pub filename: String,
    #[serde(default)]
    pub file_path: Option<String>,
    pub chunks: Vec<NewChunk>,
}

/// Document row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub filename: String,
    pub file_path: String,
    pub upload_date: String,
    pub total_chunks: usize,
}

/// One page of a document's chunks, for previews
#[derive(Debug, Clone, Serialize)]
pub struct ChunkPage {
    pub total: usize,
    pub skip: usize,
    pub limit: usize,
    pub chunks: Vec<Chunk>,
}

/// Kind of exchange kept in the QA history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QaMode {
    /// Answer to a user question
    Fact,
    /// Generated study question with its answer
    Question,
}

impl QaMode {
    pub fn as_str(self) -> &'static str {
        match self {
            QaMode::Fact => "fact",
            QaMode::Question => "question",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "fact" => Some(QaMode::Fact),
            "question" => Some(QaMode::Question),
            _ => None,
        }
    }
}

/// Question/answer pair to append to the history
#[derive(Debug, Clone)]
pub struct NewQaEntry {
    pub query: String,
    pub answer: String,
    /// Cited sources, serialized as a JSON array
    pub sources_json: String,
    pub mode: QaMode,
    pub topic: String,
}

/// Stored question/answer pair
#[derive(Debug, Clone, Serialize)]
pub struct QaEntry {
    pub id: i64,
    pub query: String,
    pub answer: String,
    pub sources: serde_json::Value,
    pub mode: QaMode,
    pub topic: String,
    pub created_at: String,
}
