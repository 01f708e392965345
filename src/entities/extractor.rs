//! Query keyword extraction
//!
//! Pulls proper-noun candidates, year candidates and salient lowercase terms out
//! of a free-text question. Works for Latin and Cyrillic scripts alike.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

/// Interrogatives and function words of English and Russian questions
const STOP_WORDS: &[&str] = &[
    // English
    "who", "whom", "whose", "what", "when", "where", "which", "why", "how", "did", "does",
    "was", "were", "the", "and", "about", "after", "before", "their", "there", "these",
    "those", "would", "could", "should", "being", "other", "while", "with", "from", "into",
    "tell", "explain", "describe", "between", "during", "under", "because", "happened",
    // Russian
    "кто", "что", "когда", "где", "куда", "откуда", "почему", "зачем", "какой", "какая",
    "какое", "какие", "каким", "какими", "каких", "каков", "какова", "каковы", "сколько",
    "который", "которая", "которое", "которые", "как", "был", "была", "было", "были",
    "этот", "эта", "это", "эти", "этого", "этой", "того", "также", "после", "перед",
    "между", "через", "может", "можно", "нужно", "очень", "более", "менее", "такой",
    "такие", "чтобы", "потому", "расскажи", "расскажите", "объясни", "объясните",
    "опиши", "опишите", "назови", "назовите", "произошло", "происходило", "имеет",
];

/// What kind of evidence an extracted term carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Capitalised token such as a person or place name
    ProperNoun,
    /// Three or four digit number
    Year,
    /// Lowercase salient term longer than four characters
    Keyword,
}

/// One extracted query term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    pub kind: EntityKind,
}

/// Deduplicated set of query terms, kept in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySet {
    entities: Vec<Entity>,
}

impl EntitySet {
    /// Insert unless an entity with the same case-folded text exists
    fn insert(&mut self, seen: &mut AHashSet<String>, text: &str, kind: EntityKind) {
        if seen.insert(text.to_lowercase()) {
            self.entities.push(Entity {
                text: text.to_string(),
                kind,
            });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    /// Surface forms used as containment patterns
    pub fn patterns(&self) -> Vec<String> {
        self.entities.iter().map(|e| e.text.clone()).collect()
    }

    pub fn proper_nouns(&self) -> impl Iterator<Item = &Entity> {
        self.entities
            .iter()
            .filter(|e| e.kind == EntityKind::ProperNoun)
    }

    /// Number of entities occurring verbatim (case-insensitively) in `content`
    pub fn count_in(&self, content: &str) -> usize {
        let haystack = content.to_lowercase();
        self.entities
            .iter()
            .filter(|e| haystack.contains(&e.text.to_lowercase()))
            .count()
    }
}

/// Extracts an [`EntitySet`] from a query
#[derive(Debug, Clone)]
pub struct KeywordExtractor {
    stop_words: AHashSet<String>,
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl KeywordExtractor {
    /// Create an extractor using the built-in stop words plus `extra_stop_words`
    pub fn new(extra_stop_words: &[String]) -> Self {
        let stop_words = STOP_WORDS
            .iter()
            .map(|w| w.to_string())
            .chain(extra_stop_words.iter().map(|w| w.to_lowercase()))
            .collect();
        Self { stop_words }
    }

    /// Extract query terms. An empty query yields an empty set.
    pub fn extract(&self, query: &str) -> EntitySet {
        let mut set = EntitySet::default();
        let mut seen = AHashSet::new();

        for token in query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            if is_year(token) {
                set.insert(&mut seen, token, EntityKind::Year);
                continue;
            }
            if token.chars().all(|c| c.is_numeric()) {
                continue;
            }

            let lowered = token.to_lowercase();
            if self.stop_words.contains(&lowered) {
                continue;
            }

            if is_proper_noun(token) {
                set.insert(&mut seen, token, EntityKind::ProperNoun);
            } else if lowered.chars().count() > 4 {
                set.insert(&mut seen, &lowered, EntityKind::Keyword);
            }
        }

        set
    }
}

fn is_year(token: &str) -> bool {
    (3..=4).contains(&token.len()) && token.chars().all(|c| c.is_ascii_digit())
}

/// Uppercase letter followed by one or more lowercase letters
fn is_proper_noun(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) if first.is_uppercase() => {
            let rest: Vec<char> = chars.collect();
            !rest.is_empty() && rest.iter().all(|c| c.is_lowercase())
        }
        _ => false,
    }
}
