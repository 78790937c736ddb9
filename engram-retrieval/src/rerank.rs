//! Cross-encoder-style re-ranking with a diversity penalty.
//!
//! Score = 0.5 * similarity + 0.3 * importance + 0.2 * lexical overlap.
//! Items lacking a dense similarity contribute similarity 0. After
//! scoring, a top-down pass penalizes candidates by their maximum
//! Jaccard token similarity to anything already kept.

use std::collections::HashSet;

use engram_index::bm25::tokenize;

/// Fraction of query tokens that appear in the content.
pub fn lexical_overlap(query: &str, content: &str) -> f64 {
    let query_tokens: Vec<String> = tokenize(query);
    if query_tokens.is_empty() {
        return 0.0;
    }
    let content_tokens: HashSet<String> = tokenize(content).into_iter().collect();
    let hits = query_tokens
        .iter()
        .filter(|t| content_tokens.contains(*t))
        .count();
    hits as f64 / query_tokens.len() as f64
}

/// Jaccard similarity of the two texts' token sets.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// The weighted cross-encoder-style score.
pub fn cross_encoder_score(similarity: f64, importance: f64, overlap: f64) -> f64 {
    0.5 * similarity + 0.3 * importance + 0.2 * overlap
}

/// Re-rank in place: replace each item's score with the cross-encoder
/// score, apply the diversity penalty top-down, re-sort descending, and
/// truncate to `limit`.
///
/// Items are (score slot, similarity, importance, content token set).
pub fn rerank_scores(
    items: &mut Vec<RerankItem>,
    query: &str,
    diversity_penalty: f64,
    limit: usize,
) {
    for item in items.iter_mut() {
        let overlap = lexical_overlap(query, &item.content);
        item.score = cross_encoder_score(item.similarity, item.importance, overlap);
    }
    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    // Diversity pass: each candidate after the first is penalized by its
    // worst-case token overlap with what is already selected.
    let mut selected_tokens: Vec<HashSet<String>> = Vec::new();
    for item in items.iter_mut() {
        let tokens: HashSet<String> = tokenize(&item.content).into_iter().collect();
        if !selected_tokens.is_empty() {
            let max_jaccard = selected_tokens
                .iter()
                .map(|s| jaccard(s, &tokens))
                .fold(0.0f64, f64::max);
            item.score *= 1.0 - max_jaccard * diversity_penalty;
        }
        selected_tokens.push(tokens);
    }

    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    items.truncate(limit);
}

/// The subset of candidate state re-ranking needs.
#[derive(Debug, Clone)]
pub struct RerankItem {
    pub id: i64,
    pub content: String,
    pub similarity: f64,
    pub importance: f64,
    pub score: f64,
}
