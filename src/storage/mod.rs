//! Storage layer for Lectern
//!
//! Documents, chunks and persisted embeddings live in one SQLite database
//! under the data directory.

pub mod cancel;
pub mod database;
pub mod models;

use crate::error::{LecternError, Result};
use std::path::{Path, PathBuf};

pub use cancel::{CancelOnDrop, Cancellation, Registration};
pub use database::{Database, DbPool, DbStats};
pub use models::{Chunk, ChunkPage, Document, DocumentImport, NewChunk, NewQaEntry, QaEntry, QaMode};

/// Read access to stored chunks, as needed by retrieval and question generation
///
/// Implementations must be callable from blocking worker threads. Lookups on
/// the request path take a [`Cancellation`] and should stop early, returning
/// [`LecternError::Cancelled`], once it fires.
pub trait ChunkStore: Send + Sync {
    /// Chunks whose content contains at least one pattern, compared
    /// case-insensitively, ordered by document then position
    fn chunks_matching_any(
        &self,
        document_id: Option<i64>,
        patterns: &[String],
        limit: usize,
        cancel: &Cancellation,
    ) -> Result<Vec<Chunk>>;

    /// All chunks of a document, ordered by position
    fn chunks_by_document(&self, document_id: i64) -> Result<Vec<Chunk>>;

    /// Chunks with the given ids, in no particular order
    fn chunks_by_ids(&self, ids: &[i64], cancel: &Cancellation) -> Result<Vec<Chunk>>;

    /// Chunks whose paragraph label contains `paragraph`, falling back to a
    /// `§ N` marker in the content; ordered by page then position
    fn chunks_for_paragraph(
        &self,
        document_id: i64,
        paragraph: &str,
        cancel: &Cancellation,
    ) -> Result<Vec<Chunk>>;
}

/// Storage manager owning the data directory
pub struct StorageManager {
    pub database: Database,
    base_path: PathBuf,
}

impl StorageManager {
    /// Create a new storage manager
    pub fn new(base_path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&base_path).map_err(|e| LecternError::Io {
            source: e,
            context: format!("Failed to create data directory: {}", base_path.display()),
        })?;

        let database = Database::new(&base_path.join("db.sqlite"))?;

        Ok(Self {
            database,
            base_path,
        })
    }

    /// Path of the SQLite database file
    pub fn db_path(&self) -> PathBuf {
        self.base_path.join("db.sqlite")
    }

    /// Import a pre-chunked document, returning its id
    pub fn import(&self, import: &models::DocumentImport) -> Result<i64> {
        if import.chunks.is_empty() {
            return Err(LecternError::InvalidInput(format!(
                "Document {} has no chunks",
                import.filename
            )));
        }

        let file_path = import
            .file_path
            .clone()
            .unwrap_or_else(|| import.filename.clone());
        let document_id = self.database.insert_document(&import.filename, &file_path)?;
        if let Err(e) = self.database.insert_chunks(document_id, &import.chunks) {
            self.database.delete_document(document_id)?;
            return Err(e);
        }

        tracing::info!(
            "Imported {} chunks for document {} ({})",
            import.chunks.len(),
            document_id,
            import.filename
        );
        Ok(document_id)
    }

    /// Get combined storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            db: self.database.stats()?,
            data_dir_size: Self::dir_size(&self.base_path)?,
        })
    }

    /// Calculate directory size recursively
    fn dir_size(path: &Path) -> Result<u64> {
        let mut size = 0u64;

        if path.is_dir() {
            for entry in std::fs::read_dir(path).map_err(|e| LecternError::Io {
                source: e,
                context: format!(
                    "Failed to read directory for size calculation: {}",
                    path.display()
                ),
            })? {
                let entry = entry.map_err(|e| LecternError::Io {
                    source: e,
                    context: "Failed to read directory entry for size calculation".to_string(),
                })?;
                let path = entry.path();

                if path.is_dir() {
                    size += Self::dir_size(&path)?;
                } else {
                    size += entry
                        .metadata()
                        .map_err(|e| LecternError::Io {
                            source: e,
                            context: format!("Failed to get file metadata: {}", path.display()),
                        })?
                        .len();
                }
            }
        }

        Ok(size)
    }
}

/// Combined storage statistics
#[derive(Debug, serde::Serialize)]
pub struct StorageStats {
    pub db: DbStats,
    pub data_dir_size: u64,
}

impl StorageStats {
    /// Format size as human-readable string
    pub fn format_size(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
