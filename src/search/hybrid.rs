use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{ScopeFilter, ScoredChunk};
use crate::search::lexical::{keyword_search, LexicalHit};
use crate::search::vector::{VectorHit, VectorIndex};

/// Additive score fusion keyed by `(doc_name, chunk_id)`.
///
/// Pipeline:
/// 1. Seed from vector hits with their normalised score (`1 / (1 + distance)`).
/// 2. Add each lexical hit's score to an existing entry, or insert it.
/// 3. Sort descending by fused score and keep `limit`.
///
/// Equal scores keep first-seen order: vector hits by rank, then lexical-only
/// hits by rank.
pub fn fuse(vector_hits: &[VectorHit], lexical_hits: &[LexicalHit], limit: usize) -> Vec<ScoredChunk> {
    type Key = (String, u32);
    let mut slots: HashMap<Key, usize> = HashMap::new();
    let mut fused: Vec<ScoredChunk> = Vec::new();

    for hit in vector_hits {
        let key: Key = (hit.chunk.doc_name.clone(), hit.chunk.chunk_id);
        if slots.contains_key(&key) {
            continue;
        }
        slots.insert(key, fused.len());
        fused.push(ScoredChunk::new(&hit.chunk, hit.score));
    }

    for hit in lexical_hits {
        let key: Key = (hit.chunk.doc_name.clone(), hit.chunk.chunk_id);
        match slots.get(&key) {
            Some(&i) => fused[i].score += hit.score,
            None => {
                slots.insert(key, fused.len());
                fused.push(ScoredChunk::new(&hit.chunk, hit.score));
            }
        }
    }

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused.truncate(limit);
    fused
}

/// Runs vector and lexical search side by side and fuses the results.
pub struct HybridRetriever {
    index: Arc<VectorIndex>,
}

impl HybridRetriever {
    pub fn new(index: Arc<VectorIndex>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Top-`k` chunks for `query`. With a scope, only chunks tagged with
    /// exactly that scope are considered by either search. Both searches read
    /// the same index state.
    ///
    /// A failing vector search degrades to lexical-only results instead of
    /// failing the request.
    pub async fn search(&self, query: &str, k: usize, scope_id: Option<i64>) -> Vec<ScoredChunk> {
        if k == 0 {
            return Vec::new();
        }
        let filter = ScopeFilter::from_scope_id(scope_id);
        let candidates = k * 2;

        let snapshot = self.index.search_with_pool(query, candidates, filter).await;
        let vector_hits = match snapshot.hits {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!("Vector search unavailable, falling back to keyword search: {e}");
                Vec::new()
            }
        };

        let mut lexical_hits = keyword_search(query, &snapshot.pool);
        lexical_hits.truncate(candidates);

        tracing::debug!(
            "Hybrid search: {} vector hits, {} keyword hits (scope {scope_id:?})",
            vector_hits.len(),
            lexical_hits.len()
        );

        fuse(&vector_hits, &lexical_hits, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;
    use crate::search::lexical::TERM_WEIGHT;
    use crate::search::vector::distance_to_score;

    fn chunk(doc: &str, id: u32) -> Chunk {
        Chunk {
            doc_name: doc.into(),
            page_num: 1,
            chunk_id: id,
            text: format!("content of {doc} chunk {id}"),
            scope_id: None,
        }
    }

    fn vector_hit(doc: &str, id: u32, distance: f32) -> VectorHit {
        VectorHit {
            position: id as usize,
            chunk: chunk(doc, id),
            distance,
            score: distance_to_score(distance),
        }
    }

    fn lexical_hit(doc: &str, id: u32, terms: usize) -> LexicalHit {
        LexicalHit {
            chunk: chunk(doc, id),
            matched_terms: terms,
            score: terms as f32 * TERM_WEIGHT,
        }
    }

    #[test]
    fn test_empty_inputs() {
        assert!(fuse(&[], &[], 5).is_empty());
    }

    #[test]
    fn test_vector_only_keeps_distance_order() {
        let results = fuse(
            &[vector_hit("a.pdf", 0, 0.5), vector_hit("a.pdf", 1, 2.0)],
            &[],
            10,
        );
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_id, 0);
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_overlap_sums_component_scores() {
        let v = vector_hit("a.pdf", 3, 1.0);
        let l = lexical_hit("a.pdf", 3, 2);
        let results = fuse(&[v.clone()], &[l.clone()], 10);

        assert_eq!(results.len(), 1);
        assert!((results[0].score - (v.score + l.score)).abs() < 1e-6);
    }

    #[test]
    fn test_match_in_both_outranks_single_method() {
        // b.pdf#1 is found by both; a.pdf#0 only by vector with a better distance
        // than b's vector score alone would beat.
        let results = fuse(
            &[vector_hit("a.pdf", 0, 0.8), vector_hit("b.pdf", 1, 1.0)],
            &[lexical_hit("b.pdf", 1, 1), lexical_hit("c.pdf", 2, 3)],
            10,
        );

        let both = results.iter().position(|r| r.doc_name == "b.pdf").unwrap();
        let vector_only = results.iter().position(|r| r.doc_name == "a.pdf").unwrap();
        assert!(both < vector_only);
        assert!((results[both].score - (0.5 + 0.1)).abs() < 1e-6);
    }

    #[test]
    fn test_same_chunk_id_in_different_docs_not_merged() {
        let results = fuse(&[vector_hit("a.pdf", 0, 0.0)], &[lexical_hit("b.pdf", 0, 1)], 10);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_limit_respected() {
        let hits: Vec<VectorHit> = (0..20).map(|i| vector_hit("a.pdf", i, i as f32)).collect();
        assert_eq!(fuse(&hits, &[], 5).len(), 5);
    }

    #[test]
    fn test_limit_larger_than_candidates_returns_all() {
        let results = fuse(&[vector_hit("a.pdf", 0, 0.0)], &[lexical_hit("a.pdf", 1, 1)], 50);
        assert_eq!(results.len(), 2);
    }
}
