//! Prompt templates for answers and study questions

use crate::retrieval::RankedResult;
use crate::text::truncate_chars;
use std::fmt::Write;

/// Fixed reply when the fragments do not contain the answer
pub const NOT_FOUND_ANSWER: &str = "The answer was not found in the textbook.";

pub const ANSWER_SYSTEM: &str = "You are a textbook assistant. Answer strictly from the provided \
fragments and never add facts that are not in them.\n\
Answer in the language of the question, in at most three sentences.\n\
After the answer, cite where it came from in exactly this format:\n\
Source: [page X, chapter Y, §Z]\n\
Leave out the chapter or paragraph when a fragment does not have one.\n\
If the fragments do not contain the answer, reply exactly: \
The answer was not found in the textbook.";

pub const QUESTION_SYSTEM: &str = "You write study questions for a textbook paragraph.\n\
Every question must be answerable from the text alone.\n\
Reply in the language of the text, in exactly this format:\n\
QUESTIONS:\n\
1. Question\n\
2. Question\n\
ANSWERS:\n\
1. Answer [page X]\n\
2. Answer [page X]";

/// Context block of numbered fragments followed by the question
///
/// Each fragment carries its page, chapter and paragraph so the model can
/// cite it; content is cut to `fragment_budget` characters.
pub fn build_answer_prompt(query: &str, results: &[RankedResult], fragment_budget: usize) -> String {
    let mut prompt = String::from("Textbook fragments:\n\n");

    for (i, result) in results.iter().enumerate() {
        let meta = &result.metadata;
        let mut header = format!("[Fragment {} | Page {}", i + 1, meta.page);
        let location: Vec<&str> = [meta.chapter.trim(), meta.paragraph.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect();
        if !location.is_empty() {
            let _ = write!(header, " | {}", location.join(" "));
        }
        header.push(']');

        let _ = writeln!(prompt, "{}", header);
        let _ = writeln!(prompt, "{}", truncate_chars(result.content.trim(), fragment_budget));
        prompt.push_str("---\n");
    }

    let _ = write!(prompt, "\nQuestion: {}\n\nAnswer:", query.trim());
    prompt
}

/// Ask for `count` question/answer pairs over a paragraph's text
pub fn build_question_prompt(text: &str, count: usize, context_chars: usize) -> String {
    format!(
        "Write {count} questions with short answers about this textbook paragraph.\n\n\
         Text:\n{text}\n",
        count = count,
        text = truncate_chars(text.trim(), context_chars)
    )
}
