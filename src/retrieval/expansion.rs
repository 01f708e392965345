//! Query expansion through paraphrases from the generative model

use crate::config::Config;
use crate::llm::{generate_with_timeout, GenerationError, GenerativeModel};
use ahash::AHashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const EXPANSION_SYSTEM: &str =
    "You help improve textbook search. Reply briefly with the variants only, one per line.";

/// Asks the generative model for alternative phrasings of a query
pub struct QueryExpander {
    model: Arc<dyn GenerativeModel>,
    max_variants: usize,
    temperature: f32,
    timeout: Duration,
}

impl QueryExpander {
    pub fn new(model: Arc<dyn GenerativeModel>, config: &Config) -> Self {
        Self {
            model,
            max_variants: config.retrieval.max_query_variants.max(1),
            temperature: config.synthesis.expansion_temperature,
            timeout: config.timeouts.expansion(),
        }
    }

    /// Query variants, original first; `[query]` when expansion fails
    pub async fn expand(&self, query: &str) -> Vec<String> {
        match self.try_expand(query).await {
            Ok(variants) => variants,
            Err(e) => {
                warn!("Query expansion failed, searching the original query only: {}", e);
                vec![query.to_string()]
            }
        }
    }

    /// Like [`QueryExpander::expand`] but reports generation failures
    pub async fn try_expand(&self, query: &str) -> Result<Vec<String>, GenerationError> {
        let prompt = format!(
            "Rephrase the question in {n} different ways for searching a history textbook.\n\
             Keep the meaning but vary the wording. Use the language of the question.\n\n\
             Question: {query}\n\n\
             Example:\n\
             Question: \"How did Caesar die?\"\n\
             Variants:\n\
             - death of Gaius Julius Caesar\n\
             - assassination of Caesar\n\
             - circumstances of Caesar's murder\n\n\
             Now for the question above:",
            n = self.max_variants.saturating_sub(1).max(1),
            query = query
        );

        let response = generate_with_timeout(
            self.model.as_ref(),
            &prompt,
            EXPANSION_SYSTEM,
            self.temperature,
            self.timeout,
        )
        .await?;

        let variants = parse_variants(query, &response, self.max_variants);
        debug!("Expanded query into {} variants", variants.len());
        Ok(variants)
    }
}

/// Parse one variant per line, original query first, capped at `cap` entries
///
/// List markers and numbering are stripped; headers, blank lines and
/// repeats of earlier variants are skipped.
pub fn parse_variants(query: &str, response: &str, cap: usize) -> Vec<String> {
    let mut variants = vec![query.to_string()];
    let mut seen: AHashSet<String> = AHashSet::new();
    seen.insert(query.trim().to_lowercase());

    for line in response.lines() {
        if variants.len() >= cap {
            break;
        }

        let line = strip_marker(line.trim()).trim_matches('"').trim();
        if line.is_empty() || line.ends_with(':') {
            continue;
        }
        let lowered = line.to_lowercase();
        if lowered.starts_with("variant") || lowered.starts_with("вариант") {
            continue;
        }
        if seen.insert(lowered) {
            variants.push(line.to_string());
        }
    }

    variants
}

/// Remove a leading `-`, `•`, `*`, `1.` or `1)` list marker
fn strip_marker(line: &str) -> &str {
    if let Some(rest) = line.strip_prefix(['-', '•', '*']) {
        return rest.trim_start();
    }

    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(['.', ')']) {
            return rest.trim_start();
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Scripted(Result<String, ()>);

    #[async_trait]
    impl GenerativeModel for Scripted {
        async fn generate(&self, _: &str, _: &str, _: f32) -> Result<String, GenerationError> {
            self.0
                .clone()
                .map_err(|_| GenerationError::Unavailable("offline".to_string()))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    #[test]
    fn test_parse_strips_markers_and_caps() {
        let response = "Variants:\n- death of Caesar\n2. assassination of Caesar\n3) Caesar's murder\n• fifth";
        let variants = parse_variants("How did Caesar die?", response, 4);

        assert_eq!(
            variants,
            vec![
                "How did Caesar die?",
                "death of Caesar",
                "assassination of Caesar",
                "Caesar's murder",
            ]
        );
    }

    #[test]
    fn test_parse_skips_headers_and_duplicates() {
        let response = "Вариант 1:\nубийство Цезаря\n\n- убийство цезаря\n- Как умер Цезарь?";
        let variants = parse_variants("Как умер Цезарь?", response, 4);

        assert_eq!(variants, vec!["Как умер Цезарь?", "убийство Цезаря"]);
    }

    #[test]
    fn test_parse_unusable_output() {
        assert_eq!(parse_variants("q", "", 4), vec!["q"]);
        assert_eq!(parse_variants("q", "Variants:\n\n", 4), vec!["q"]);
    }

    #[tokio::test]
    async fn test_expand_falls_back_to_original() {
        let expander = QueryExpander::new(Arc::new(Scripted(Err(()))), &Config::default());
        assert_eq!(expander.expand("Who killed Caesar?").await, vec!["Who killed Caesar?"]);
    }

    #[tokio::test]
    async fn test_expand_keeps_original_first() {
        let model = Scripted(Ok("- Caesar's assassins\n- murder of Caesar".to_string()));
        let expander = QueryExpander::new(Arc::new(model), &Config::default());

        let variants = expander.expand("Who killed Caesar?").await;
        assert_eq!(variants.len(), 3);
        assert_eq!(variants[0], "Who killed Caesar?");
    }
}
