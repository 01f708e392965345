//! Study question generation for a textbook paragraph

use super::QaPipeline;
use crate::error::{LecternError, Result};
use crate::storage::{Cancellation, Chunk};
use crate::text::label_id;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// A generated question with where its answer lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub question: String,
    pub answer: String,
    pub page: u32,
    pub chapter: String,
    pub paragraph: String,
}

impl QaPipeline {
    /// Generate up to `count` questions about one paragraph of a document
    ///
    /// Fails with [`LecternError::InvalidInput`] for a non-positive document id,
    /// an empty paragraph or a zero count, and with
    /// [`LecternError::ParagraphNotFound`] when no chunk belongs to the
    /// paragraph. A failed generation yields an empty list.
    pub async fn generate_questions(
        &self,
        document_id: i64,
        chapter: &str,
        paragraph: &str,
        count: usize,
    ) -> Result<Vec<GeneratedQuestion>> {
        if document_id <= 0 {
            return Err(LecternError::InvalidInput(format!(
                "Invalid document id: {}",
                document_id
            )));
        }
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            return Err(LecternError::InvalidInput(
                "Paragraph reference is empty".to_string(),
            ));
        }
        if count == 0 {
            return Err(LecternError::InvalidInput(
                "Number of questions must be positive".to_string(),
            ));
        }

        let request_id = Uuid::new_v4();
        self.questions(document_id, chapter, paragraph, count)
            .instrument(info_span!("questions", request_id = %request_id))
            .await
    }

    async fn questions(
        &self,
        document_id: i64,
        chapter: &str,
        paragraph: &str,
        count: usize,
    ) -> Result<Vec<GeneratedQuestion>> {
        let chunks = self.paragraph_chunks(document_id, chapter, paragraph).await?;
        let Some(first) = chunks.first() else {
            return Err(LecternError::ParagraphNotFound {
                document_id,
                paragraph: paragraph.to_string(),
            });
        };

        let default_page = first.page_number;
        let chapter = non_empty_or(&first.chapter, chapter);
        let paragraph_label = non_empty_or(&first.paragraph, paragraph);
        let text = chunks
            .iter()
            .map(|c| c.content.trim())
            .collect::<Vec<_>>()
            .join("\n\n");
        debug!(
            "Paragraph {} spans {} chunks from page {}",
            paragraph_label,
            chunks.len(),
            default_page
        );

        let parsed = match self
            .synthesizer
            .synthesize_questions(&text, count, default_page)
            .await
        {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Question generation failed: {}", e);
                return Ok(Vec::new());
            }
        };

        info!("Generated {} questions", parsed.len());
        Ok(parsed
            .into_iter()
            .map(|q| GeneratedQuestion {
                question: q.question,
                answer: q.answer,
                page: q.page,
                chapter: chapter.clone(),
                paragraph: paragraph_label.clone(),
            })
            .collect())
    }

    /// Chunks of the paragraph ordered by page then position
    ///
    /// Narrowed to `chapter` when some chunk's chapter carries the same
    /// identifier, and to exact paragraph identifiers when any match exactly.
    async fn paragraph_chunks(
        &self,
        document_id: i64,
        chapter: &str,
        paragraph: &str,
    ) -> Result<Vec<Chunk>> {
        let store = Arc::clone(&self.store);
        let label = paragraph.to_string();
        let cancel = Cancellation::new();
        let _cancel_on_drop = cancel.drop_guard();
        let lookup = tokio::task::spawn_blocking(move || {
            store.chunks_for_paragraph(document_id, &label, &cancel)
        });

        let mut chunks = match tokio::time::timeout(self.settings.search_timeout, lookup).await {
            Ok(joined) => joined.map_err(|e| anyhow::anyhow!("Paragraph lookup failed: {}", e))??,
            Err(_) => {
                return Err(anyhow::anyhow!(
                    "Paragraph lookup timed out after {:?}",
                    self.settings.search_timeout
                )
                .into())
            }
        };

        let chapter_id = label_id(chapter);
        if !chapter_id.is_empty() {
            narrow(&mut chunks, |c| label_id(&c.chapter) == chapter_id);
        }
        let paragraph_id = label_id(paragraph);
        if !paragraph_id.is_empty() {
            narrow(&mut chunks, |c| label_id(&c.paragraph) == paragraph_id);
        }

        chunks.sort_by_key(|c| (c.page_number, c.position));
        Ok(chunks)
    }
}

/// Keep only chunks matching `keep`, unless none do
fn narrow(chunks: &mut Vec<Chunk>, keep: impl Fn(&Chunk) -> bool) {
    if chunks.iter().any(&keep) {
        chunks.retain(|c| keep(c));
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.trim().to_string()
    } else {
        value.to_string()
    }
}
