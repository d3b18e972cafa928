use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::Chunk;

/// Score contributed by each distinct query term found in a chunk.
pub const TERM_WEIGHT: f32 = 0.1;

#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub chunk: Chunk,
    pub matched_terms: usize,
    pub score: f32,
}

fn word_regex() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"\w+").expect("static regex is valid"))
}

/// Distinct lowercase word terms of `query`.
pub fn query_terms(query: &str) -> BTreeSet<String> {
    let lower = query.to_lowercase();
    word_regex()
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Score `candidates` by how many distinct query terms occur as substrings of
/// their lowercased text. Chunks matching no term are dropped. Results are
/// ordered by score, descending; equal scores keep candidate order.
pub fn keyword_search<'a>(query: &str, candidates: impl IntoIterator<Item = &'a Chunk>) -> Vec<LexicalHit> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return Vec::new();
    }

    let mut hits: Vec<LexicalHit> = candidates
        .into_iter()
        .filter_map(|chunk| {
            let text = chunk.text.to_lowercase();
            let matched_terms = terms.iter().filter(|t| text.contains(t.as_str())).count();
            (matched_terms > 0).then(|| LexicalHit {
                chunk: chunk.clone(),
                matched_terms,
                score: matched_terms as f32 * TERM_WEIGHT,
            })
        })
        .collect();

    // `sort_by` is stable, which keeps candidate order among ties.
    hits.sort_by(|a, b| b.matched_terms.cmp(&a.matched_terms));
    hits
}
