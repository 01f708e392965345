//! Question/answer history
//!
//! Answers and generated study questions are appended to the `qa_log` table
//! so they can be reviewed or reused as test material later.

use super::GeneratedQuestion;
use crate::error::{LecternError, Result};
use crate::storage::{Database, NewQaEntry, QaMode};
use crate::synthesis::{AnswerResult, AnswerStatus};
use crate::text::truncate_chars;
use serde_json::json;

const TOPIC_CHARS: usize = 100;

/// Record an answer; not-found answers are skipped
pub fn record_answer(db: &Database, query: &str, answer: &AnswerResult) -> Result<Option<i64>> {
    if answer.status == AnswerStatus::NotFound {
        return Ok(None);
    }

    let sources_json = serde_json::to_string(&answer.citations).map_err(|e| LecternError::Json {
        source: e,
        context: "Failed to serialize citations".to_string(),
    })?;

    let id = db.log_qa(&NewQaEntry {
        query: query.trim().to_string(),
        answer: answer.answer.clone(),
        sources_json,
        mode: QaMode::Fact,
        topic: truncate_chars(query.trim(), TOPIC_CHARS).to_string(),
    })?;
    Ok(Some(id))
}

/// Record each generated question with the paragraph it came from
pub fn record_questions(db: &Database, questions: &[GeneratedQuestion]) -> Result<usize> {
    for q in questions {
        let sources = json!([{
            "page": q.page,
            "chapter": q.chapter,
            "paragraph": q.paragraph,
        }]);
        db.log_qa(&NewQaEntry {
            query: q.question.clone(),
            answer: q.answer.clone(),
            sources_json: sources.to_string(),
            mode: QaMode::Question,
            topic: format!("{} {}", q.chapter, q.paragraph).trim().to_string(),
        })?;
    }
    Ok(questions.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesis::Citation;
    use std::time::Duration;
    use tempfile::TempDir;

    fn database(temp: &TempDir) -> Database {
        Database::new(&temp.path().join("db.sqlite")).unwrap()
    }

    #[test]
    fn test_answer_recorded_with_citations() {
        let temp = TempDir::new().unwrap();
        let db = database(&temp);
        let answer = AnswerResult {
            answer: "Senators.".to_string(),
            citations: vec![Citation::page(112)],
            confidence: 0.8,
            processing_time: Duration::from_millis(40),
            status: AnswerStatus::Synthesized,
        };

        let id = record_answer(&db, "  Who killed Caesar? ", &answer).unwrap();
        assert!(id.is_some());

        let history = db.qa_history(Some(QaMode::Fact), 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].query, "Who killed Caesar?");
        assert_eq!(history[0].topic, "Who killed Caesar?");
        assert_eq!(history[0].sources[0]["page"], 112);
    }

    #[test]
    fn test_not_found_answer_is_skipped() {
        let temp = TempDir::new().unwrap();
        let db = database(&temp);

        let id = record_answer(&db, "Who?", &AnswerResult::not_found(Duration::ZERO)).unwrap();
        assert!(id.is_none());
        assert!(db.qa_history(None, 10).unwrap().is_empty());
    }

    #[test]
    fn test_questions_recorded_with_paragraph_topic() {
        let temp = TempDir::new().unwrap();
        let db = database(&temp);
        let questions = vec![
            GeneratedQuestion {
                question: "When was the last emperor deposed?".to_string(),
                answer: "In 476".to_string(),
                page: 41,
                chapter: "Глава 3".to_string(),
                paragraph: "§ 7".to_string(),
            },
            GeneratedQuestion {
                question: "Who sent the regalia east?".to_string(),
                answer: "Odoacer".to_string(),
                page: 41,
                chapter: String::new(),
                paragraph: "§ 7".to_string(),
            },
        ];

        assert_eq!(record_questions(&db, &questions).unwrap(), 2);

        let history = db.qa_history(Some(QaMode::Question), 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].topic, "§ 7");
        assert_eq!(history[1].topic, "Глава 3 § 7");
        assert_eq!(history[1].sources[0]["paragraph"], "§ 7");
    }
}
