//! Tolerant parsing of free-form model output
//!
//! Everything unstructured the model says is turned into typed values here;
//! nothing past the synthesizer sees raw model text.

use crate::error::{LecternError, Result};
use crate::synthesis::Citation;
use regex::Regex;
use serde::Deserialize;

/// Answer body plus the citations the model claimed
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAnswer {
    pub body: String,
    pub citations: Vec<Citation>,
}

/// One generated question with its answer and page
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuestion {
    pub question: String,
    pub answer: String,
    pub page: u32,
}

#[derive(Deserialize)]
struct JsonAnswer {
    answer: String,
    #[serde(default)]
    sources: Vec<JsonSource>,
}

#[derive(Deserialize)]
struct JsonSource {
    #[serde(default)]
    page: Option<serde_json::Value>,
    #[serde(default)]
    chapter: Option<String>,
    #[serde(default)]
    paragraph: Option<String>,
}

/// Compiled patterns for answers and question lists
pub struct ResponseParser {
    reference: Regex,
    page: Regex,
    chapter: Regex,
    paragraph: Regex,
    questions_header: Regex,
    answers_header: Regex,
    numbered_item: Regex,
    page_override: Regex,
}

fn compile(name: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| LecternError::Config(format!("Invalid regex for {}: {}", name, e)))
}

impl ResponseParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            reference: compile(
                "reference",
                r"(?i)(?:sources?|источники?)\s*:\s*\[([^\]]*)\]",
            )?,
            page: compile(
                "page",
                r"(?i)(?:\bpages?|\bpp?\.|\bстр\.?|\bстраниц[аеы]?)\s*(\d+)",
            )?,
            chapter: compile("chapter", r"(?i)(?:\bchapter|\bглава|\bгл\.)\s*([\p{L}\p{N}]+)")?,
            paragraph: compile(
                "paragraph",
                r"(?i)(?:§|\bparagraph\b|\bпараграф\b)\s*(\d+(?:\.\d+)*)",
            )?,
            questions_header: compile(
                "questions header",
                r"(?im)^[\s#*]*(?:questions|вопросы)[\s*]*:?[\s*]*$",
            )?,
            answers_header: compile(
                "answers header",
                r"(?im)^[\s#*]*(?:answers|ответы)[\s*]*:?[\s*]*$",
            )?,
            numbered_item: compile("numbered item", r"(?m)^\s*\d+\s*[.)]\s*(.+?)\s*$")?,
            page_override: compile(
                "page override",
                r"(?i)\[\s*(?:pages?|p\.|стр\.?|страница)\s*(\d+)\s*\]",
            )?,
        })
    }

    /// Split a model answer into body and claimed citations
    ///
    /// A JSON object `{"answer", "sources"}` is accepted as-is; otherwise
    /// `Source: [...]` references are lifted out of the text and any remaining
    /// bare page mentions become page-only citations.
    pub fn parse_answer(&self, raw: &str) -> ParsedAnswer {
        if let Some(parsed) = self.parse_json_answer(raw) {
            return parsed;
        }

        let mut citations = Vec::new();
        for caps in self.reference.captures_iter(raw) {
            let text = caps.get(1).map_or("", |m| m.as_str()).trim();
            citations.push(self.parse_reference(text));
        }
        let body = self.reference.replace_all(raw, "");

        for caps in self.page.captures_iter(&body) {
            let Some(page) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) else {
                continue;
            };
            if !citations.iter().any(|c: &Citation| c.page == Some(page)) {
                citations.push(Citation::page(page));
            }
        }

        ParsedAnswer {
            body: tidy(&body),
            citations,
        }
    }

    fn parse_json_answer(&self, raw: &str) -> Option<ParsedAnswer> {
        let start = raw.find('{')?;
        let end = raw.rfind('}')?;
        if end <= start {
            return None;
        }

        let json: JsonAnswer = serde_json::from_str(&raw[start..=end]).ok()?;
        if json.answer.trim().is_empty() {
            return None;
        }

        let citations = json
            .sources
            .into_iter()
            .map(|s| Citation {
                page: s.page.and_then(|v| match v {
                    serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
                    serde_json::Value::String(s) => {
                        s.trim().trim_start_matches("стр.").trim().parse().ok()
                    }
                    _ => None,
                }),
                chapter: s.chapter.filter(|c| !c.trim().is_empty()),
                paragraph: s.paragraph.filter(|p| !p.trim().is_empty()),
                reference: None,
            })
            .collect();

        Some(ParsedAnswer {
            body: json.answer.trim().to_string(),
            citations,
        })
    }

    /// Read page, chapter and paragraph out of one reference's text
    fn parse_reference(&self, text: &str) -> Citation {
        let capture = |re: &Regex| {
            re.captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        };

        Citation {
            page: capture(&self.page).and_then(|p| p.parse().ok()),
            chapter: capture(&self.chapter),
            paragraph: capture(&self.paragraph),
            reference: Some(text.to_string()),
        }
    }

    /// Pair numbered questions with numbered answers
    ///
    /// The questions section runs from its header (or the start of the text)
    /// to the answers header. A `[page N]` marker on either side overrides
    /// `default_page`. At most `cap` questions are returned.
    pub fn parse_questions(&self, raw: &str, default_page: u32, cap: usize) -> Vec<ParsedQuestion> {
        let answers_at = self.answers_header.find(raw);
        let questions_end = answers_at.map_or(raw.len(), |m| m.start());
        let questions_start = self
            .questions_header
            .find(&raw[..questions_end])
            .map_or(0, |m| m.end());

        let questions_text = &raw[questions_start..questions_end];
        let answers_text = answers_at.map_or("", |m| &raw[m.end()..]);

        let items = |text: &str| -> Vec<String> {
            self.numbered_item
                .captures_iter(text)
                .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
                .collect()
        };
        let answers = items(answers_text);

        items(questions_text)
            .into_iter()
            .enumerate()
            .take(cap)
            .map(|(i, question)| {
                let (question, question_page) = self.split_page(&question);
                let (answer, answer_page) = answers
                    .get(i)
                    .map(|a| self.split_page(a))
                    .unwrap_or_default();

                ParsedQuestion {
                    question,
                    answer,
                    page: answer_page.or(question_page).unwrap_or(default_page),
                }
            })
            .collect()
    }

    fn split_page(&self, text: &str) -> (String, Option<u32>) {
        let page = self
            .page_override
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok());
        let cleaned = self.page_override.replace_all(text, "");
        (cleaned.trim().to_string(), page)
    }
}

/// Trim lines and drop blank runs left behind by removed references
fn tidy(text: &str) -> String {
    let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.trim().is_empty() && out.last().map_or(true, |l| l.trim().is_empty()) {
            continue;
        }
        out.push(line);
    }
    out.join("\n").trim().to_string()
}
