//! Dynamic context packing for downstream LLM use.
//!
//! Re-scores retrieved items by blending relevance with importance,
//! then greedily accumulates content into an estimated token budget.

use engram_core::models::{PackedContext, RetrievedMemory};

/// Token estimate for a string: ceil(len / 4).
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Pack items into `max_tokens`. `importance_weight` is the blend factor
/// alpha; items with relevance below `min_relevance` are skipped.
pub fn pack(
    items: &[RetrievedMemory],
    max_tokens: usize,
    importance_weight: f64,
    min_relevance: f64,
) -> PackedContext {
    let mut scored: Vec<(&RetrievedMemory, f64)> = items
        .iter()
        .filter(|item| item.score >= min_relevance)
        .map(|item| {
            let context_score = (1.0 - importance_weight) * item.score
                + importance_weight * item.importance as f64;
            (item, context_score)
        })
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.id.cmp(&b.0.id))
    });

    let mut text = String::new();
    let mut selected = Vec::new();
    let mut used_tokens = 0usize;

    for (item, _) in scored {
        let cost = estimate_tokens(&item.content);
        if used_tokens + cost > max_tokens {
            continue;
        }
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&item.content);
        selected.push(item.id);
        used_tokens += cost;
    }

    PackedContext { text, selected, estimated_tokens: used_tokens }
}
