//! Grounded answer synthesis
//!
//! [`AnswerSynthesizer`] turns ranked results into a prompt, asks the
//! generative model for an answer, and keeps only the citations that point
//! back at the results it was given.

mod citation;
mod parser;
mod prompts;

pub use citation::{validate_citations, Citation};
pub use parser::{ParsedAnswer, ParsedQuestion, ResponseParser};
pub use prompts::{build_answer_prompt, build_question_prompt, NOT_FOUND_ANSWER};

use crate::config::Config;
use crate::error::Result;
use crate::llm::{generate_with_timeout, GenerationError, GenerativeModel};
use crate::retrieval::RankedResult;
use crate::text::truncate_with_ellipsis;
use serde::{Deserialize, Serialize, Serializer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How an answer was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    /// The generative model answered from the supplied fragments
    Synthesized,
    /// Retrieval found nothing; no model call was made
    NotFound,
    /// The model failed; the answer is the top fragment's raw text
    SynthesisUnavailable,
}

/// Final answer with validated citations
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub confidence: f32,
    #[serde(serialize_with = "serialize_secs")]
    pub processing_time: Duration,
    pub status: AnswerStatus,
}

impl AnswerResult {
    pub fn not_found(processing_time: Duration) -> Self {
        Self {
            answer: NOT_FOUND_ANSWER.to_string(),
            citations: Vec::new(),
            confidence: 0.0,
            processing_time,
            status: AnswerStatus::NotFound,
        }
    }
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

pub struct AnswerSynthesizer {
    model: Arc<dyn GenerativeModel>,
    parser: ResponseParser,
    fragment_budget: usize,
    question_context_chars: usize,
    fallback_chars: usize,
    answer_temperature: f32,
    question_temperature: f32,
    lexical_confidence: f32,
    timeout: Duration,
}

impl AnswerSynthesizer {
    pub fn new(model: Arc<dyn GenerativeModel>, config: &Config) -> Result<Self> {
        Ok(Self {
            model,
            parser: ResponseParser::new()?,
            fragment_budget: config.synthesis.fragment_char_budget,
            question_context_chars: config.synthesis.question_context_chars,
            fallback_chars: config.synthesis.fallback_answer_chars,
            answer_temperature: config.synthesis.answer_temperature,
            question_temperature: config.synthesis.question_temperature,
            lexical_confidence: config.retrieval.lexical_confidence,
            timeout: config.timeouts.synthesis(),
        })
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Answer `query` from `results`
    ///
    /// Never fails: an empty result set yields the not-found answer without a
    /// model call, and a failed model call yields the top fragment's text.
    /// With non-empty results the citation list is never empty.
    pub async fn synthesize(&self, query: &str, results: &[RankedResult]) -> AnswerResult {
        let start = Instant::now();

        let Some(top) = results.first() else {
            debug!("No results to synthesize from");
            return AnswerResult::not_found(start.elapsed());
        };
        let confidence = self.confidence(top);
        let fallback_citation = Citation::from_metadata(&top.metadata);

        let prompt = build_answer_prompt(query, results, self.fragment_budget);
        let response = generate_with_timeout(
            self.model.as_ref(),
            &prompt,
            prompts::ANSWER_SYSTEM,
            self.answer_temperature,
            self.timeout,
        )
        .await;

        let raw = match response {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Synthesis unavailable, returning top fragment: {}", e);
                return AnswerResult {
                    answer: truncate_with_ellipsis(top.content.trim(), self.fallback_chars),
                    citations: vec![fallback_citation],
                    confidence,
                    processing_time: start.elapsed(),
                    status: AnswerStatus::SynthesisUnavailable,
                };
            }
        };

        let parsed = self.parser.parse_answer(&raw);
        let claimed = parsed.citations.len();
        let mut citations = validate_citations(&parsed.citations, results);
        debug!("{} of {} citations validated", citations.len(), claimed);

        if citations.is_empty() {
            citations.push(fallback_citation);
        }

        let answer = if parsed.body.is_empty() {
            NOT_FOUND_ANSWER.to_string()
        } else {
            parsed.body
        };

        AnswerResult {
            answer,
            citations,
            confidence,
            processing_time: start.elapsed(),
            status: AnswerStatus::Synthesized,
        }
    }

    /// Study questions over a paragraph's text
    ///
    /// Pages default to `default_page` unless the model marks another one.
    pub async fn synthesize_questions(
        &self,
        text: &str,
        count: usize,
        default_page: u32,
    ) -> std::result::Result<Vec<ParsedQuestion>, GenerationError> {
        let prompt = build_question_prompt(text, count, self.question_context_chars);
        let raw = generate_with_timeout(
            self.model.as_ref(),
            &prompt,
            prompts::QUESTION_SYSTEM,
            self.question_temperature,
            self.timeout,
        )
        .await?;

        Ok(self.parser.parse_questions(&raw, default_page, count))
    }

    fn confidence(&self, top: &RankedResult) -> f32 {
        match top.distance {
            Some(distance) => (1.0 - distance).clamp(0.0, 1.0),
            None => self.lexical_confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{ChunkMetadata, Provenance};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(reply.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl GenerativeModel for Scripted {
        async fn generate(&self, _: &str, _: &str, _: f32) -> std::result::Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .clone()
                .ok_or_else(|| GenerationError::Unavailable("connection refused".to_string()))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn result(content: &str, page: u32, distance: Option<f32>) -> RankedResult {
        RankedResult {
            content: content.to_string(),
            metadata: ChunkMetadata {
                chunk_id: page as i64,
                document_id: 1,
                page,
                chapter: String::new(),
                paragraph: String::new(),
                section_title: String::new(),
                position: page,
            },
            score: 1.0,
            provenance: if distance.is_some() {
                Provenance::Hybrid
            } else {
                Provenance::Lexical
            },
            distance,
        }
    }

    fn synthesizer(model: Arc<Scripted>) -> AnswerSynthesizer {
        AnswerSynthesizer::new(model, &Config::default()).unwrap()
    }

    #[tokio::test]
    async fn test_empty_results_skip_the_model() {
        let model = Scripted::replying("should not be used");
        let result = synthesizer(model.clone()).synthesize("q", &[]).await;

        assert_eq!(result.status, AnswerStatus::NotFound);
        assert_eq!(result.answer, NOT_FOUND_ANSWER);
        assert!(result.citations.is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_valid_citation_kept() {
        let model = Scripted::replying("Caesar was killed by senators.\nSource: [page 112]");
        let results = vec![result("Caesar was killed by senators.", 112, Some(0.2))];
        let answer = synthesizer(model).synthesize("Who killed Caesar?", &results).await;

        assert_eq!(answer.status, AnswerStatus::Synthesized);
        assert_eq!(answer.answer, "Caesar was killed by senators.");
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].page, Some(112));
        assert!((answer.confidence - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_invalid_citations_replaced_by_top_result() {
        let model = Scripted::replying("Brutus did it. Source: [page 999]");
        let results = vec![result("Brutus", 7, None), result("Cassius", 8, None)];
        let answer = synthesizer(model).synthesize("Who?", &results).await;

        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].page, Some(7));
        assert_eq!(answer.confidence, Config::default().retrieval.lexical_confidence);
    }

    #[tokio::test]
    async fn test_model_failure_returns_top_fragment() {
        let long = "Caesar ".repeat(100);
        let results = vec![result(&long, 112, Some(0.1))];
        let answer = synthesizer(Scripted::failing()).synthesize("q", &results).await;

        assert_eq!(answer.status, AnswerStatus::SynthesisUnavailable);
        assert!(answer.answer.ends_with("..."));
        assert_eq!(answer.answer.chars().count(), 303);
        assert_eq!(answer.citations[0].page, Some(112));
    }

    #[tokio::test]
    async fn test_questions_default_page() {
        let model = Scripted::replying("QUESTIONS:\n1. When?\nANSWERS:\n1. In 476.");
        let questions = synthesizer(model)
            .synthesize_questions("Rome fell in 476.", 3, 40)
            .await
            .unwrap();

        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].page, 40);
    }

    #[test]
    fn test_result_serialization() {
        let result = AnswerResult::not_found(Duration::from_millis(1500));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "not_found");
        assert_eq!(json["processing_time"], 1.5);
    }
}
