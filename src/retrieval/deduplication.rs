//! Hit deduplication by chunk identity

use crate::retrieval::{ChunkKey, SearchHit};
use ahash::{AHashMap, AHashSet};

/// Deduplicate hits by chunk key; the first occurrence wins
pub fn deduplicate_hits(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut seen: AHashSet<ChunkKey> = AHashSet::new();

    hits.into_iter().filter(|hit| seen.insert(hit.key())).collect()
}

/// Pool vector hits from several query variants
///
/// Keeps the smallest distance per chunk and returns the pool closest first.
pub fn pool_vector_hits(lists: Vec<Vec<SearchHit>>) -> Vec<SearchHit> {
    let mut best: AHashMap<ChunkKey, SearchHit> = AHashMap::new();

    for hit in lists.into_iter().flatten() {
        match best.get(&hit.key()) {
            Some(existing) if existing.raw_score <= hit.raw_score => {}
            _ => {
                best.insert(hit.key(), hit);
            }
        }
    }

    let mut pooled: Vec<SearchHit> = best.into_values().collect();
    pooled.sort_by(|a, b| {
        a.raw_score
            .total_cmp(&b.raw_score)
            .then_with(|| a.key().cmp(&b.key()))
    });
    pooled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{ChunkMetadata, SearchPath};

    fn hit(page: u32, position: u32, score: f32, path: SearchPath) -> SearchHit {
        SearchHit {
            content: format!("chunk {}", position),
            metadata: ChunkMetadata {
                chunk_id: position as i64,
                document_id: 1,
                page,
                chapter: String::new(),
                paragraph: String::new(),
                section_title: String::new(),
                position,
            },
            raw_score: score,
            path,
        }
    }

    #[test]
    fn test_deduplication() {
        let hits = vec![
            hit(1, 1, 3.0, SearchPath::Lexical),
            hit(1, 2, 2.0, SearchPath::Lexical),
            hit(1, 1, 1.0, SearchPath::Lexical),
        ];

        let deduped = deduplicate_hits(hits);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].raw_score, 3.0);
    }

    #[test]
    fn test_pool_keeps_closest_distance() {
        let pooled = pool_vector_hits(vec![
            vec![hit(5, 1, 0.4, SearchPath::Vector), hit(6, 2, 0.3, SearchPath::Vector)],
            vec![hit(5, 1, 0.1, SearchPath::Vector)],
            vec![],
        ]);

        assert_eq!(pooled.len(), 2);
        assert_eq!(pooled[0].metadata.position, 1);
        assert_eq!(pooled[0].raw_score, 0.1);
        assert_eq!(pooled[1].raw_score, 0.3);
    }
}
