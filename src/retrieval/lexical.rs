//! Lexical containment search over stored chunks

use crate::config::{RetrievalConfig, ScoringWeights};
use crate::entities::EntitySet;
use crate::retrieval::{SearchError, SearchHit, SearchPath};
use crate::storage::{Cancellation, ChunkStore};
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

/// Case-insensitive matchers for one query entity
struct EntityMatcher {
    needle: String,
    whole_word: Option<Regex>,
}

/// Scores chunk content against a query's entities
struct ChunkScorer {
    matchers: Vec<EntityMatcher>,
    /// Word-prefix matchers for proper-noun stems
    clusters: Vec<Regex>,
    weights: ScoringWeights,
}

impl ChunkScorer {
    fn new(entities: &EntitySet, weights: ScoringWeights, min_stem: usize, max_trim: usize) -> Self {
        let matchers = entities
            .iter()
            .map(|e| EntityMatcher {
                needle: e.text.to_lowercase(),
                whole_word: Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&e.text))).ok(),
            })
            .collect();

        let clusters = entities
            .proper_nouns()
            .filter_map(|e| {
                let stem = identity_stem(&e.text, min_stem, max_trim);
                Regex::new(&format!(r"(?i)\b{}", regex::escape(&stem))).ok()
            })
            .collect();

        Self {
            matchers,
            clusters,
            weights,
        }
    }

    /// Returns `None` when the content contains none of the entities
    fn score(&self, content: &str) -> Option<f32> {
        let haystack = content.to_lowercase();
        let mut matched = 0usize;
        let mut whole_words = 0usize;

        for matcher in &self.matchers {
            if haystack.contains(&matcher.needle) {
                matched += 1;
                if matcher
                    .whole_word
                    .as_ref()
                    .is_some_and(|re| re.is_match(content))
                {
                    whole_words += 1;
                }
            }
        }

        if matched == 0 {
            return None;
        }

        let mut score = self.weights.entity_match * matched as f32
            + self.weights.whole_word_bonus * whole_words as f32;
        if self.clusters.iter().any(|re| re.is_match(content)) {
            score += self.weights.identity_cluster_bonus;
        }
        Some(score)
    }
}

/// Stem shared by the inflected forms of a name
///
/// Trims up to `max_trim` trailing characters but keeps at least `min_stem`.
pub(crate) fn identity_stem(name: &str, min_stem: usize, max_trim: usize) -> String {
    let lowered: Vec<char> = name.to_lowercase().chars().collect();
    let trim = max_trim.min(lowered.len().saturating_sub(min_stem));
    lowered[..lowered.len() - trim].iter().collect()
}

/// Relational containment search ranked by entity overlap
pub struct LexicalSearcher {
    store: Arc<dyn ChunkStore>,
    weights: ScoringWeights,
    min_stem_chars: usize,
    max_inflection_chars: usize,
}

impl LexicalSearcher {
    pub fn new(store: Arc<dyn ChunkStore>, config: &RetrievalConfig) -> Self {
        Self {
            store,
            weights: config.weights,
            min_stem_chars: config.min_stem_chars,
            max_inflection_chars: config.max_inflection_chars,
        }
    }

    /// Chunks containing at least one entity, best overlap first
    ///
    /// An empty entity set returns immediately without touching the store.
    pub async fn search(
        &self,
        entities: &EntitySet,
        document_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        if entities.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let store = Arc::clone(&self.store);
        let patterns = entities.patterns();
        let cancel = Cancellation::new();
        let _cancel_on_drop = cancel.drop_guard();
        let chunks = tokio::task::spawn_blocking(move || {
            store.chunks_matching_any(document_id, &patterns, limit, &cancel)
        })
        .await
        .map_err(|e| SearchError::TaskFailed(e.to_string()))?
        .map_err(SearchError::from_store)?;

        let hits = self.rank(entities, chunks);
        debug!("Lexical path: {} hits for {} entities", hits.len(), entities.len());
        Ok(hits)
    }

    fn rank(&self, entities: &EntitySet, chunks: Vec<crate::storage::Chunk>) -> Vec<SearchHit> {
        let scorer = ChunkScorer::new(
            entities,
            self.weights,
            self.min_stem_chars,
            self.max_inflection_chars,
        );

        let mut hits: Vec<SearchHit> = chunks
            .into_iter()
            .filter_map(|chunk| {
                let score = scorer.score(&chunk.content)?;
                Some(SearchHit::from_chunk(chunk, score, SearchPath::Lexical))
            })
            .collect();

        hits.sort_by(|a, b| {
            b.raw_score
                .total_cmp(&a.raw_score)
                .then_with(|| a.key().cmp(&b.key()))
        });
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::entities::KeywordExtractor;
    use crate::error::Result;
    use crate::storage::Chunk;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory store that counts round-trips
    struct CountingStore {
        chunks: Vec<Chunk>,
        calls: AtomicUsize,
    }

    impl CountingStore {
        fn new(contents: &[&str]) -> Self {
            let chunks = contents
                .iter()
                .enumerate()
                .map(|(i, content)| Chunk {
                    id: i as i64 + 1,
                    document_id: 1,
                    content: content.to_string(),
                    page_number: 100 + i as u32,
                    chapter: String::new(),
                    paragraph: String::new(),
                    section_title: String::new(),
                    position: i as u32,
                    embedding_id: None,
                })
                .collect();
            Self {
                chunks,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ChunkStore for CountingStore {
        fn chunks_matching_any(
            &self,
            document_id: Option<i64>,
            patterns: &[String],
            limit: usize,
            _cancel: &Cancellation,
        ) -> Result<Vec<Chunk>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .chunks
                .iter()
                .filter(|c| document_id.map_or(true, |d| c.document_id == d))
                .filter(|c| {
                    let content = c.content.to_lowercase();
                    patterns.iter().any(|p| content.contains(&p.to_lowercase()))
                })
                .take(limit)
                .cloned()
                .collect())
        }

        fn chunks_by_document(&self, _document_id: i64) -> Result<Vec<Chunk>> {
            Ok(self.chunks.clone())
        }

        fn chunks_by_ids(&self, _ids: &[i64], _cancel: &Cancellation) -> Result<Vec<Chunk>> {
            Ok(Vec::new())
        }

        fn chunks_for_paragraph(
            &self,
            _document_id: i64,
            _paragraph: &str,
            _cancel: &Cancellation,
        ) -> Result<Vec<Chunk>> {
            Ok(Vec::new())
        }
    }

    fn searcher(store: Arc<CountingStore>) -> LexicalSearcher {
        LexicalSearcher::new(store, &Config::default().retrieval)
    }

    #[test]
    fn test_identity_stem() {
        assert_eq!(identity_stem("Цезарь", 4, 2), "цеза");
        assert_eq!(identity_stem("Caesar", 4, 2), "caes");
        assert_eq!(identity_stem("Рима", 4, 2), "рима");
        assert_eq!(identity_stem("Nero", 3, 2), "ner");
    }

    #[tokio::test]
    async fn test_empty_entities_skip_store() {
        let store = Arc::new(CountingStore::new(&["anything"]));
        let hits = searcher(Arc::clone(&store))
            .search(&EntitySet::default(), None, 10)
            .await
            .unwrap();

        assert!(hits.is_empty());
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_scoring_prefers_whole_words_and_identity_cluster() {
        let store = Arc::new(CountingStore::new(&[
            "The Caesarean reforms changed the calendar.",
            "Caesar was killed by senators.",
            "Senators met in the curia.",
        ]));
        let entities = KeywordExtractor::default().extract("Who killed Caesar?");

        let hits = searcher(Arc::clone(&store))
            .search(&entities, None, 10)
            .await
            .unwrap();

        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].metadata.page, 101);
        // killed + Caesar matched, both whole words, plus the name cluster
        assert_eq!(hits[0].raw_score, 1.0 * 2.0 + 1.0 * 2.0 + 3.0);
        // substring-only match still gets the cluster bonus
        assert_eq!(hits[1].raw_score, 1.0 + 3.0);
    }

    #[tokio::test]
    async fn test_inflected_forms_share_cluster_bonus() {
        let store = Arc::new(CountingStore::new(&[
            "Заговорщики убили Цезаря в сенате. Цезарь не ожидал удара.",
            "Сенат собирался в курии.",
        ]));
        let entities = KeywordExtractor::default().extract("Кто убил Цезаря?");

        let hits = searcher(store).search(&entities, None, 10).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert!(hits[0].raw_score >= 1.0 + 1.0 + 3.0);
    }

    #[tokio::test]
    async fn test_no_false_positives() {
        let store = Arc::new(CountingStore::new(&[
            "Octavian defeated Antony.",
            "Antony and Cleopatra fled to Egypt.",
            "The Senate granted new titles.",
        ]));
        let entities = KeywordExtractor::default().extract("What happened to Antony?");

        let hits = searcher(store).search(&entities, None, 10).await.unwrap();

        for hit in &hits {
            let content = hit.content.to_lowercase();
            assert!(entities.iter().any(|e| content.contains(&e.text.to_lowercase())));
        }
        assert_eq!(hits.len(), 2);
    }
}
