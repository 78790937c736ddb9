//! Approximate-recall guarantee: HNSW top-10 against brute-force cosine
//! top-10 over a 1000-vector corpus.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use engram_core::constants::EMBEDDING_DIM;
use engram_core::models::NodeMetadata;
use engram_core::vector;
use engram_index::{HnswConfig, HnswIndex};

fn random_unit(rng: &mut StdRng) -> Vec<f32> {
    let v: Vec<f32> = (0..EMBEDDING_DIM).map(|_| rng.gen::<f32>() - 0.5).collect();
    vector::normalize(v)
}

fn meta() -> NodeMetadata {
    NodeMetadata {
        user_id: "u1".to_string(),
        character_id: None,
        content: "corpus".to_string(),
        created_at: 0,
        importance: 0.5,
        emotional_weight: 0.0,
        metadata: None,
    }
}

fn brute_force_top_k(corpus: &[(i64, Vec<f32>)], query: &[f32], k: usize) -> Vec<i64> {
    let mut scored: Vec<(i64, f32)> = corpus
        .iter()
        .map(|(id, v)| (*id, vector::cosine_similarity(query, v)))
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.into_iter().take(k).map(|(id, _)| id).collect()
}

#[test]
fn recall_at_10_is_at_least_point_seven() {
    let mut rng = StdRng::seed_from_u64(0xE176);
    let config = HnswConfig {
        m: 16,
        ef_construction: 200,
        ef_search: 100,
        max_layers: 5,
    };
    let mut index = HnswIndex::with_seed(config, 0xE176);

    let mut corpus: Vec<(i64, Vec<f32>)> = Vec::with_capacity(1000);
    for _ in 0..1000 {
        // Random ids, as stores assign them: sparse and unordered.
        let id = rng.gen_range(1..1_000_000_000_i64);
        if corpus.iter().any(|(existing, _)| *existing == id) {
            continue;
        }
        let v = random_unit(&mut rng);
        index.insert(id, v.clone(), meta()).unwrap();
        corpus.push((id, v));
    }
    assert_eq!(index.len(), corpus.len());
    assert!(index.health_check().healthy());

    let mut total_overlap = 0usize;
    let queries = 100;
    for _ in 0..queries {
        let q = random_unit(&mut rng);
        let exact = brute_force_top_k(&corpus, &q, 10);
        let approx: Vec<i64> = index.search(&q, 10, None).iter().map(|h| h.id).collect();
        total_overlap += approx.iter().filter(|id| exact.contains(id)).count();
    }

    let recall = total_overlap as f64 / (queries * 10) as f64;
    assert!(
        recall >= 0.7,
        "recall@10 over {queries} queries was {recall:.3}, expected >= 0.7"
    );
}
