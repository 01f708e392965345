//! SQLite database management with migrations
//!
//! Holds the documents, chunks and persisted embeddings of the corpus

use crate::error::{LecternError, Result};
use crate::storage::models::{Chunk, ChunkPage, Document, NewChunk, NewQaEntry, QaEntry, QaMode};
use crate::storage::{Cancellation, ChunkStore};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

const CHUNK_COLUMNS: &str = "id, doc_id, content, page_number, chapter, paragraph, \
                             section_title, chunk_index, embedding_id";

/// Database manager with migration support
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Create a new database connection
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LecternError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(configure_connection);

        let pool = Pool::builder()
            .max_size(16)
            .build(manager)
            .map_err(|e| LecternError::Pool(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool };
        db.migrate()?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM _migrations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);

                conn.execute_batch(migration)?;

                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Register a document and return its id
    pub fn insert_document(&self, filename: &str, file_path: &str) -> Result<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO documents (filename, file_path, upload_date, total_chunks)
             VALUES (?1, ?2, ?3, 0)",
            params![filename, file_path, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Remove a document and, through the foreign keys, its chunks and vectors
    pub fn delete_document(&self, document_id: i64) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute("DELETE FROM documents WHERE id = ?1", params![document_id])?;
        Ok(())
    }

    /// Insert chunks for a document in one transaction, returning their ids
    ///
    /// Rejects empty content and positions already used in the document.
    pub fn insert_chunks(&self, document_id: i64, chunks: &[NewChunk]) -> Result<Vec<i64>> {
        if let Some(empty) = chunks.iter().find(|c| c.content.trim().is_empty()) {
            return Err(LecternError::InvalidInput(format!(
                "Chunk at position {} has empty content",
                empty.position
            )));
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut ids = Vec::with_capacity(chunks.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (doc_id, content, page_number, chapter, paragraph,
                                     section_title, chunk_index)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for chunk in chunks {
                stmt.execute(params![
                    document_id,
                    chunk.content,
                    chunk.page_number,
                    chunk.chapter,
                    chunk.paragraph,
                    chunk.section_title,
                    chunk.position,
                ])
                .map_err(|e| match e {
                    rusqlite::Error::SqliteFailure(err, _)
                        if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        LecternError::InvalidInput(format!(
                            "Position {} already exists in document {}",
                            chunk.position, document_id
                        ))
                    }
                    other => LecternError::Database(other),
                })?;
                ids.push(tx.last_insert_rowid());
            }
        }
        tx.execute(
            "UPDATE documents SET total_chunks =
                (SELECT COUNT(*) FROM chunks WHERE doc_id = ?1)
             WHERE id = ?1",
            params![document_id],
        )?;
        tx.commit()?;

        Ok(ids)
    }

    /// Persist a chunk's embedding and record its vector-store identifier
    pub fn store_embedding(&self, chunk_id: i64, vector: &[f32], model: &str) -> Result<()> {
        let bytes: Vec<u8> = vector.iter().flat_map(|v| v.to_le_bytes()).collect();
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO embeddings (chunk_id, vector, model, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![chunk_id, bytes, model, chrono::Utc::now().timestamp()],
        )?;
        tx.execute(
            "UPDATE chunks SET embedding_id = ?1 WHERE id = ?2",
            params![format!("hnsw:{}", chunk_id), chunk_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Load every persisted embedding produced by `model`
    pub fn load_embeddings(&self, model: &str) -> Result<Vec<(i64, Vec<f32>)>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT chunk_id, vector FROM embeddings WHERE model = ?1 ORDER BY chunk_id")?;
        let rows = stmt.query_map(params![model], |row| {
            let id: i64 = row.get(0)?;
            let bytes: Vec<u8> = row.get(1)?;
            Ok((id, bytes))
        })?;

        let mut embeddings = Vec::new();
        for row in rows {
            let (id, bytes) = row?;
            let vector = bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            embeddings.push((id, vector));
        }
        Ok(embeddings)
    }

    /// Chunks with no embedding from `model` yet
    pub fn chunks_missing_embeddings(&self, model: &str) -> Result<Vec<Chunk>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM chunks
             WHERE id NOT IN (SELECT chunk_id FROM embeddings WHERE model = ?1)
             ORDER BY doc_id, chunk_index",
            CHUNK_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![model], row_to_chunk)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// All documents, oldest first
    pub fn documents(&self) -> Result<Vec<Document>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, filename, file_path, upload_date, total_chunks FROM documents ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Document {
                id: row.get(0)?,
                filename: row.get(1)?,
                file_path: row.get(2)?,
                upload_date: row.get(3)?,
                total_chunks: row.get::<_, i64>(4)? as usize,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Paginated chunk preview for one document
    pub fn document_chunks(&self, document_id: i64, skip: usize, limit: usize) -> Result<ChunkPage> {
        let conn = self.get_conn()?;
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE doc_id = ?1",
            params![document_id],
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {} FROM chunks WHERE doc_id = ?1 ORDER BY chunk_index LIMIT ?2 OFFSET ?3",
            CHUNK_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![document_id, limit as i64, skip as i64],
            row_to_chunk,
        )?;

        Ok(ChunkPage {
            total: total as usize,
            skip,
            limit,
            chunks: rows.collect::<rusqlite::Result<Vec<_>>>()?,
        })
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.get_conn()?;

        let document_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;

        let chunk_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;

        let embedded_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE embedding_id IS NOT NULL",
            [],
            |row| row.get(0),
        )?;

        Ok(DbStats {
            document_count: document_count as usize,
            chunk_count: chunk_count as usize,
            embedded_count: embedded_count as usize,
        })
    }

    /// Append a question/answer pair to the history, returning its id
    pub fn log_qa(&self, entry: &NewQaEntry) -> Result<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO qa_log (query_text, answer_text, sources_json, mode, topic, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.query,
                entry.answer,
                entry.sources_json,
                entry.mode.as_str(),
                entry.topic,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent history entries first, optionally of one mode
    pub fn qa_history(&self, mode: Option<QaMode>, limit: usize) -> Result<Vec<QaEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, query_text, answer_text, sources_json, mode, topic, created_at
             FROM qa_log
             WHERE ?1 IS NULL OR mode = ?1
             ORDER BY id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(
            params![mode.map(QaMode::as_str), limit as i64],
            |row| {
                let sources: String = row.get(3)?;
                let mode: String = row.get(4)?;
                Ok(QaEntry {
                    id: row.get(0)?,
                    query: row.get(1)?,
                    answer: row.get(2)?,
                    sources: serde_json::from_str(&sources).unwrap_or(serde_json::Value::Null),
                    mode: QaMode::parse(&mode).unwrap_or(QaMode::Fact),
                    topic: row.get(5)?,
                    created_at: row.get(6)?,
                })
            },
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Run a chunk query that SQLite aborts once `cancel` fires
    fn query_chunks(
        &self,
        sql: &str,
        values: Vec<Value>,
        cancel: &Cancellation,
    ) -> Result<Vec<Chunk>> {
        let conn = self.get_conn()?;
        let interrupt = conn.get_interrupt_handle();
        let _registration = cancel.register(move || interrupt.interrupt());
        if cancel.is_cancelled() {
            return Err(LecternError::Cancelled);
        }

        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), row_to_chunk)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl ChunkStore for Database {
    fn chunks_matching_any(
        &self,
        document_id: Option<i64>,
        patterns: &[String],
        limit: usize,
        cancel: &Cancellation,
    ) -> Result<Vec<Chunk>> {
        if patterns.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut values: Vec<Value> = patterns
            .iter()
            .map(|p| Value::Text(p.to_lowercase()))
            .collect();
        let filter = (1..=patterns.len())
            .map(|i| format!("instr(casefold(content), ?{}) > 0", i))
            .collect::<Vec<_>>()
            .join(" OR ");

        let mut sql = format!("SELECT {} FROM chunks WHERE ({})", CHUNK_COLUMNS, filter);
        if let Some(id) = document_id {
            values.push(Value::Integer(id));
            sql.push_str(&format!(" AND doc_id = ?{}", values.len()));
        }
        values.push(Value::Integer(limit as i64));
        sql.push_str(&format!(" ORDER BY doc_id, chunk_index LIMIT ?{}", values.len()));

        self.query_chunks(&sql, values, cancel)
    }

    fn chunks_by_document(&self, document_id: i64) -> Result<Vec<Chunk>> {
        let sql = format!(
            "SELECT {} FROM chunks WHERE doc_id = ?1 ORDER BY chunk_index",
            CHUNK_COLUMNS
        );
        self.query_chunks(&sql, vec![Value::Integer(document_id)], &Cancellation::new())
    }

    fn chunks_by_ids(&self, ids: &[i64], cancel: &Cancellation) -> Result<Vec<Chunk>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (1..=ids.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM chunks WHERE id IN ({})",
            CHUNK_COLUMNS, placeholders
        );
        self.query_chunks(
            &sql,
            ids.iter().map(|id| Value::Integer(*id)).collect(),
            cancel,
        )
    }

    fn chunks_for_paragraph(
        &self,
        document_id: i64,
        paragraph: &str,
        cancel: &Cancellation,
    ) -> Result<Vec<Chunk>> {
        let label = paragraph.trim().to_lowercase();
        let sql = format!(
            "SELECT {} FROM chunks
             WHERE doc_id = ?1 AND instr(casefold(paragraph), ?2) > 0
             ORDER BY page_number, chunk_index",
            CHUNK_COLUMNS
        );
        let chunks = self.query_chunks(
            &sql,
            vec![Value::Integer(document_id), Value::Text(label.clone())],
            cancel,
        )?;
        if !chunks.is_empty() {
            return Ok(chunks);
        }

        // Paragraph label missing from metadata: look for the marker in the text
        let number = label.trim_start_matches('§').trim();
        let sql = format!(
            "SELECT {} FROM chunks
             WHERE doc_id = ?1
               AND (instr(casefold(content), ?2) > 0 OR instr(casefold(content), ?3) > 0)
             ORDER BY page_number, chunk_index",
            CHUNK_COLUMNS
        );
        self.query_chunks(
            &sql,
            vec![
                Value::Integer(document_id),
                Value::Text(format!("§ {}", number)),
                Value::Text(format!("§{}", number)),
            ],
            cancel,
        )
    }
}

/// Per-connection setup: pragmas plus the `casefold` function used by
/// containment filters (SQLite's own `lower()` only folds ASCII).
fn configure_connection(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    conn.create_scalar_function(
        "casefold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )
}

fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    Ok(Chunk {
        id: row.get(0)?,
        document_id: row.get(1)?,
        content: row.get(2)?,
        page_number: row.get(3)?,
        chapter: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        paragraph: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        section_title: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        position: row.get(7)?,
        embedding_id: row.get(8)?,
    })
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub document_count: usize,
    pub chunk_count: usize,
    pub embedded_count: usize,
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    CREATE TABLE documents (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        filename TEXT NOT NULL,
        file_path TEXT NOT NULL,
        upload_date TEXT NOT NULL,
        total_chunks INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE chunks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        doc_id INTEGER NOT NULL,
        content TEXT NOT NULL CHECK (length(trim(content)) > 0),
        page_number INTEGER NOT NULL DEFAULT 1,
        chapter TEXT,
        paragraph TEXT,
        section_title TEXT,
        chunk_index INTEGER NOT NULL,
        embedding_id TEXT,
        FOREIGN KEY (doc_id) REFERENCES documents(id) ON DELETE CASCADE,
        UNIQUE (doc_id, chunk_index)
    );

    CREATE INDEX idx_chunks_doc ON chunks(doc_id);
    CREATE INDEX idx_chunks_page ON chunks(doc_id, page_number);

    CREATE TABLE embeddings (
        chunk_id INTEGER PRIMARY KEY,
        vector BLOB NOT NULL,
        model TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        FOREIGN KEY (chunk_id) REFERENCES chunks(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_embeddings_model ON embeddings(model);
    "#,
    // Migration 2: question/answer history
    r#"
    CREATE TABLE qa_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        query_text TEXT NOT NULL,
        answer_text TEXT NOT NULL,
        sources_json TEXT NOT NULL DEFAULT '[]',
        mode TEXT NOT NULL,
        topic TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL
    );

    CREATE INDEX idx_qa_log_mode ON qa_log(mode);
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(position: u32, page: u32, paragraph: &str, content: &str) -> NewChunk {
        NewChunk {
            content: content.to_string(),
            page_number: page,
            chapter: "Глава 5".to_string(),
            paragraph: paragraph.to_string(),
            section_title: String::new(),
            position,
        }
    }

    fn seeded() -> (TempDir, Database, i64) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
        let doc = db.insert_document("history.pdf", "/tmp/history.pdf").unwrap();
        db.insert_chunks(
            doc,
            &[
                chunk(0, 40, "§ 2", "Цезарь перешёл Рубикон в 49 году до н. э."),
                chunk(1, 41, "§ 2", "Сенаторы убили ЦЕЗАРЯ в мартовские иды."),
                chunk(2, 58, "§ 3", "Octavian defeated Antony at Actium."),
            ],
        )
        .unwrap();
        (temp_dir, db, doc)
    }

    #[test]
    fn test_database_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let _db = Database::new(&db_path).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_migrations() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();

        let conn = db.get_conn().unwrap();
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM _migrations", [], |row| row.get(0))
            .unwrap();

        assert_eq!(version, MIGRATIONS.len() as i32);
    }

    #[test]
    fn test_foreign_keys_enabled_on_every_connection() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();

        let first = db.get_conn().unwrap();
        let second = db.get_conn().unwrap();
        for conn in [&first, &second] {
            let fk_enabled: i32 = conn
                .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
                .unwrap();
            assert_eq!(fk_enabled, 1);
        }
    }

    #[test]
    fn test_matching_any_is_case_insensitive_for_cyrillic() {
        let (_tmp, db, _doc) = seeded();
        let live = Cancellation::new();

        let hits = db
            .chunks_matching_any(None, &["цезар".to_string()], 10, &live)
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].position, 0);
        assert_eq!(hits[1].position, 1);
    }

    #[test]
    fn test_matching_any_respects_limit_and_document() {
        let (_tmp, db, doc) = seeded();
        let patterns = vec!["цезар".to_string(), "actium".to_string()];
        let live = Cancellation::new();

        assert_eq!(db.chunks_matching_any(None, &patterns, 10, &live).unwrap().len(), 3);
        assert_eq!(db.chunks_matching_any(None, &patterns, 1, &live).unwrap().len(), 1);
        assert!(db
            .chunks_matching_any(Some(doc + 1), &patterns, 10, &live)
            .unwrap()
            .is_empty());
        assert!(db.chunks_matching_any(None, &[], 10, &live).unwrap().is_empty());
    }

    #[test]
    fn test_insert_rejects_duplicate_position() {
        let (_tmp, db, doc) = seeded();
        let result = db.insert_chunks(doc, &[chunk(1, 42, "§ 2", "Duplicate position")]);
        assert!(matches!(result, Err(LecternError::InvalidInput(_))));
    }

    #[test]
    fn test_insert_rejects_empty_content() {
        let (_tmp, db, doc) = seeded();
        let result = db.insert_chunks(doc, &[chunk(9, 42, "§ 2", "   ")]);
        assert!(matches!(result, Err(LecternError::InvalidInput(_))));
    }

    #[test]
    fn test_chunks_for_paragraph_ordered_by_page() {
        let (_tmp, db, doc) = seeded();
        let chunks = db
            .chunks_for_paragraph(doc, "§ 2", &Cancellation::new())
            .unwrap();
        let pages: Vec<u32> = chunks.iter().map(|c| c.page_number).collect();
        assert_eq!(pages, vec![40, 41]);
    }

    #[test]
    fn test_chunks_for_paragraph_falls_back_to_content_marker() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
        let doc = db.insert_document("b.pdf", "/tmp/b.pdf").unwrap();
        db.insert_chunks(doc, &[chunk(0, 7, "", "§7 The Punic Wars began in 264 BC.")])
            .unwrap();

        let live = Cancellation::new();
        let chunks = db.chunks_for_paragraph(doc, "7", &live).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(db.chunks_for_paragraph(doc, "§ 7", &live).unwrap().len(), 1);
        assert!(db.chunks_for_paragraph(doc, "8", &live).unwrap().is_empty());
    }

    #[test]
    fn test_embeddings_roundtrip_and_stats() {
        let (_tmp, db, doc) = seeded();
        let chunks = db.chunks_by_document(doc).unwrap();
        db.store_embedding(chunks[0].id, &[0.25, -1.5, 3.0], "hash").unwrap();

        let loaded = db.load_embeddings("hash").unwrap();
        assert_eq!(loaded, vec![(chunks[0].id, vec![0.25, -1.5, 3.0])]);
        assert!(db.load_embeddings("other").unwrap().is_empty());
        assert_eq!(db.chunks_missing_embeddings("hash").unwrap().len(), 2);

        let stats = db.stats().unwrap();
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.chunk_count, 3);
        assert_eq!(stats.embedded_count, 1);

        let by_id = db.chunks_by_ids(&[chunks[0].id], &Cancellation::new()).unwrap();
        assert_eq!(by_id[0].embedding_id.as_deref(), Some(format!("hnsw:{}", chunks[0].id).as_str()));
    }

    #[test]
    fn test_document_chunks_pagination() {
        let (_tmp, db, doc) = seeded();
        let page = db.document_chunks(doc, 1, 1).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.chunks.len(), 1);
        assert_eq!(page.chunks[0].position, 1);

        let docs = db.documents().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].total_chunks, 3);
    }

    #[test]
    fn test_cancelled_lookup_never_reaches_sqlite() {
        let (_tmp, db, doc) = seeded();
        let cancel = Cancellation::new();
        cancel.cancel();

        let result = db.chunks_matching_any(Some(doc), &["цезар".to_string()], 10, &cancel);
        assert!(matches!(result, Err(LecternError::Cancelled)));
        let result = db.chunks_for_paragraph(doc, "§ 2", &cancel);
        assert!(matches!(result, Err(LecternError::Cancelled)));
    }

    #[test]
    fn test_cancel_interrupts_running_statement() {
        let (_tmp, db, _doc) = seeded();
        let cancel = Cancellation::new();
        let trigger = cancel.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(100));
            trigger.cancel();
        });

        // counts far past anything that could finish within the test
        let sql = format!(
            "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n LIMIT 100000000000)
             SELECT {} FROM chunks WHERE (SELECT MAX(x) FROM n) < 0",
            CHUNK_COLUMNS
        );
        let start = std::time::Instant::now();
        let result = db.query_chunks(&sql, Vec::new(), &cancel);
        canceller.join().unwrap();

        assert!(start.elapsed() < std::time::Duration::from_secs(10));
        assert!(matches!(
            result,
            Err(LecternError::Database(rusqlite::Error::SqliteFailure(err, _)))
                if err.code == rusqlite::ErrorCode::OperationInterrupted
        ));

        // the pooled connection is usable again afterwards
        let hits = db
            .chunks_matching_any(None, &["actium".to_string()], 10, &Cancellation::new())
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_qa_history_newest_first_and_filtered() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();

        db.log_qa(&NewQaEntry {
            query: "Who killed Caesar?".to_string(),
            answer: "Senators.".to_string(),
            sources_json: r#"[{"page":112}]"#.to_string(),
            mode: QaMode::Fact,
            topic: "Who killed Caesar?".to_string(),
        })
        .unwrap();
        db.log_qa(&NewQaEntry {
            query: "When did Rome fall?".to_string(),
            answer: "476".to_string(),
            sources_json: "[]".to_string(),
            mode: QaMode::Question,
            topic: "Глава 3 § 7".to_string(),
        })
        .unwrap();

        let all = db.qa_history(None, 10).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].mode, QaMode::Question);
        assert_eq!(all[1].sources[0]["page"], 112);

        let facts = db.qa_history(Some(QaMode::Fact), 10).unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].answer, "Senators.");
        assert_eq!(db.qa_history(None, 1).unwrap().len(), 1);
    }
}
