//! Hybrid merge of lexical and vector hits into a ranked top-K

use crate::config::{RetrievalConfig, ScoringWeights};
use crate::entities::EntitySet;
use crate::retrieval::{deduplicate_hits, ChunkKey, Provenance, RankedResult, SearchHit};
use ahash::AHashMap;
use std::cmp::Ordering;

/// Deterministic, I/O-free ranker combining both retrieval paths
#[derive(Debug, Clone)]
pub struct HybridRanker {
    weights: ScoringWeights,
    /// Below this many intersection results, single-path hits are backfilled
    min_merged_results: usize,
}

impl HybridRanker {
    pub fn new(config: &RetrievalConfig) -> Self {
        Self {
            weights: config.weights,
            min_merged_results: config.min_merged_results,
        }
    }

    /// Merge both paths' hits into at most `top_k` ranked results
    ///
    /// Chunks found by both paths score
    /// `hybrid_entity * entity_hits + max(0, 1 - distance)`. When fewer than
    /// `min_merged_results` such chunks exist, vector-only hits
    /// (`max(0, 1 - distance)`) and lexical-only hits (overlap score divided by
    /// the best lexical score) are added. Final scores are divided by the best
    /// score so they fall in [0, 1].
    pub fn merge(
        &self,
        lexical: Vec<SearchHit>,
        vector: Vec<SearchHit>,
        entities: &EntitySet,
        top_k: usize,
    ) -> Vec<RankedResult> {
        let lexical = deduplicate_hits(lexical);
        let vector = deduplicate_hits(vector);

        let vector_by_key: AHashMap<ChunkKey, &SearchHit> =
            vector.iter().map(|hit| (hit.key(), hit)).collect();
        let lexical_keys: AHashMap<ChunkKey, ()> =
            lexical.iter().map(|hit| (hit.key(), ())).collect();

        // Lexical hits come first, so the lexical copy of a shared chunk wins
        let mut results: Vec<RankedResult> = lexical
            .iter()
            .filter_map(|lex| {
                let vec_hit = vector_by_key.get(&lex.key())?;
                let entity_hits = entities.count_in(&lex.content) as f32;
                Some(RankedResult {
                    content: lex.content.clone(),
                    metadata: lex.metadata.clone(),
                    score: self.weights.hybrid_entity * entity_hits
                        + similarity(vec_hit.raw_score),
                    provenance: Provenance::Hybrid,
                    distance: Some(vec_hit.raw_score),
                })
            })
            .collect();

        if results.len() < self.min_merged_results {
            results.extend(
                vector
                    .iter()
                    .filter(|hit| !lexical_keys.contains_key(&hit.key()))
                    .map(|hit| RankedResult {
                        content: hit.content.clone(),
                        metadata: hit.metadata.clone(),
                        score: similarity(hit.raw_score),
                        provenance: Provenance::Vector,
                        distance: Some(hit.raw_score),
                    }),
            );

            let best_lexical = lexical
                .iter()
                .map(|hit| hit.raw_score)
                .fold(0.0f32, f32::max);
            results.extend(
                lexical
                    .iter()
                    .filter(|hit| !vector_by_key.contains_key(&hit.key()))
                    .map(|hit| RankedResult {
                        content: hit.content.clone(),
                        metadata: hit.metadata.clone(),
                        score: if best_lexical > 0.0 {
                            hit.raw_score / best_lexical
                        } else {
                            0.0
                        },
                        provenance: Provenance::Lexical,
                        distance: None,
                    }),
            );
        }

        results.sort_by(compare_ranked);
        results.truncate(top_k);

        let best = results.iter().map(|r| r.score).fold(0.0f32, f32::max);
        if best > 0.0 {
            for result in &mut results {
                result.score = (result.score / best).clamp(0.0, 1.0);
            }
        }

        results
    }
}

/// Similarity credited for a cosine distance, never negative
fn similarity(distance: f32) -> f32 {
    (1.0 - distance).max(0.0)
}

/// Score descending, then lexical > hybrid > vector, then page ascending
fn compare_ranked(a: &RankedResult, b: &RankedResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.provenance.priority().cmp(&b.provenance.priority()))
        .then_with(|| a.metadata.page.cmp(&b.metadata.page))
        .then_with(|| a.metadata.document_id.cmp(&b.metadata.document_id))
        .then_with(|| a.metadata.position.cmp(&b.metadata.position))
}
