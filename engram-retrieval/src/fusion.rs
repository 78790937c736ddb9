//! Rank fusion for the dense and sparse channels.
//!
//! Default is Reciprocal Rank Fusion: each list contributes
//! 1/(k + rank + 1) per item, merged by id. The alternative linear
//! combination normalizes each list by its max before weighting.
//! Both are commutative over their two inputs.

use std::collections::HashMap;

/// One fused candidate. `dense_similarity` is None for sparse-only items.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedItem {
    pub id: i64,
    pub score: f64,
    pub dense_similarity: Option<f64>,
    pub sparse_score: Option<f64>,
}

fn sort_fused(items: &mut Vec<FusedItem>) {
    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Reciprocal Rank Fusion with smoothing constant `k`.
///
/// Inputs are ranked lists of (id, channel score), best first. The
/// channel scores ride along for downstream stages; only the ranks
/// contribute to the fused score.
pub fn reciprocal_rank(
    dense: &[(i64, f64)],
    sparse: &[(i64, f64)],
    k: u32,
) -> Vec<FusedItem> {
    let mut scores: HashMap<i64, f64> = HashMap::new();
    let mut dense_similarity: HashMap<i64, f64> = HashMap::new();
    let mut sparse_score: HashMap<i64, f64> = HashMap::new();

    for (rank, (id, similarity)) in dense.iter().enumerate() {
        *scores.entry(*id).or_default() += 1.0 / (k as f64 + rank as f64 + 1.0);
        dense_similarity.insert(*id, *similarity);
    }
    for (rank, (id, score)) in sparse.iter().enumerate() {
        *scores.entry(*id).or_default() += 1.0 / (k as f64 + rank as f64 + 1.0);
        sparse_score.insert(*id, *score);
    }

    let mut fused: Vec<FusedItem> = scores
        .into_iter()
        .map(|(id, score)| FusedItem {
            id,
            score,
            dense_similarity: dense_similarity.get(&id).copied(),
            sparse_score: sparse_score.get(&id).copied(),
        })
        .collect();
    sort_fused(&mut fused);
    fused
}

/// Linear combination: normalize each list by its max, then weight.
/// Items present in only one list receive only that list's contribution.
pub fn linear(
    dense: &[(i64, f64)],
    sparse: &[(i64, f64)],
    dense_weight: f64,
    sparse_weight: f64,
) -> Vec<FusedItem> {
    let dense_max = dense
        .iter()
        .map(|(_, s)| *s)
        .fold(0.0f64, f64::max)
        .max(f64::MIN_POSITIVE);
    let sparse_max = sparse
        .iter()
        .map(|(_, s)| *s)
        .fold(0.0f64, f64::max)
        .max(f64::MIN_POSITIVE);

    let mut scores: HashMap<i64, f64> = HashMap::new();
    let mut dense_similarity: HashMap<i64, f64> = HashMap::new();
    let mut sparse_score: HashMap<i64, f64> = HashMap::new();

    for (id, similarity) in dense {
        *scores.entry(*id).or_default() += dense_weight * similarity / dense_max;
        dense_similarity.insert(*id, *similarity);
    }
    for (id, score) in sparse {
        *scores.entry(*id).or_default() += sparse_weight * score / sparse_max;
        sparse_score.insert(*id, *score);
    }

    let mut fused: Vec<FusedItem> = scores
        .into_iter()
        .map(|(id, score)| FusedItem {
            id,
            score,
            dense_similarity: dense_similarity.get(&id).copied(),
            sparse_score: sparse_score.get(&id).copied(),
        })
        .collect();
    sort_fused(&mut fused);
    fused
}

/// Scale fused scores so the best item sits at 1.0, making them
/// comparable with the similarity threshold downstream.
pub fn normalize_scores(items: &mut [FusedItem]) {
    let max = items.iter().map(|i| i.score).fold(0.0f64, f64::max);
    if max <= 0.0 {
        return;
    }
    for item in items {
        item.score /= max;
    }
}
