//! End-to-end engine scenarios: ingest through retrieval with the
//! deterministic in-process embedder standing in for the remote model.

use std::sync::Arc;

use async_trait::async_trait;
use engram_core::models::{NewMemory, RetrievalOptions, SearchMethod};
use engram_core::{EngineConfig, EngramResult, MemoryStore};
use engram_embeddings::{DurableCache, EmbeddingClient, HashEmbeddingClient};
use engram_engine::MemoryEngine;
use engram_storage::SqliteStore;

fn engine() -> (MemoryEngine, Arc<SqliteStore>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let engine = MemoryEngine::new(
        EngineConfig::default(),
        Arc::clone(&store) as Arc<dyn MemoryStore>,
        Arc::new(HashEmbeddingClient::new()),
        DurableCache::in_memory(),
    )
    .unwrap();
    (engine, store)
}

fn memory(user: &str, content: &str, created_at: i64, importance: f32) -> NewMemory {
    NewMemory {
        user_id: user.to_string(),
        character_id: None,
        content: content.to_string(),
        created_at,
        importance,
        emotional_weight: 0.0,
        metadata: None,
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

async fn ingest_dessert_corpus(engine: &MemoryEngine) -> (i64, i64, i64) {
    let a = engine
        .ingest(memory("u1", "I love chocolate ice cream", now() - 3000, 0.8))
        .unwrap();
    let b = engine
        .ingest(memory("u1", "Vanilla cake is my favorite", now() - 2000, 0.5))
        .unwrap();
    let c = engine
        .ingest(memory("u1", "Weather is cold today", now() - 1000, 0.3))
        .unwrap();
    engine.drain().await;
    (a, b, c)
}

#[tokio::test]
async fn chocolate_query_ranks_dessert_memories() {
    let (engine, _store) = engine();
    let (choc, cake, weather) = ingest_dessert_corpus(&engine).await;

    let response = engine
        .retrieve("u1", "chocolate dessert", &RetrievalOptions::default())
        .await
        .unwrap();

    assert_eq!(response.search_method, SearchMethod::Hybrid);
    assert!(response.used_expansion);
    assert!(!response.results.is_empty());
    assert_eq!(response.results[0].id, choc);

    let cake_pos = response.results.iter().position(|r| r.id == cake);
    let weather_pos = response.results.iter().position(|r| r.id == weather);
    assert_eq!(cake_pos, Some(1));
    // The off-topic item is last, or filtered out entirely.
    if let Some(pos) = weather_pos {
        assert_eq!(pos, response.results.len() - 1);
    }
}

#[tokio::test]
async fn conjunctive_query_surfaces_both_parts() {
    let (engine, _store) = engine();
    let (choc, cake, weather) = ingest_dessert_corpus(&engine).await;

    let response = engine
        .retrieve("u1", "ice cream and cake", &RetrievalOptions::default())
        .await
        .unwrap();

    assert!(response.results.len() >= 2);
    let top_two: Vec<i64> = response.results.iter().take(2).map(|r| r.id).collect();
    assert!(top_two.contains(&choc));
    assert!(top_two.contains(&cake));
    // Rank fusion keeps both dessert memories above the off-topic one.
    if let Some(pos) = response.results.iter().position(|r| r.id == weather) {
        assert!(pos >= 2);
    }
}

#[tokio::test]
async fn temporal_decay_prefers_the_newer_duplicate() {
    let (engine, _store) = engine();
    let sixty_days = 60 * 86_400;
    let old = engine
        .ingest(memory("u1", "enjoys painting tiny miniatures", now() - sixty_days, 0.9))
        .unwrap();
    let new = engine
        .ingest(memory("u1", "enjoys painting tiny miniatures", now(), 0.1))
        .unwrap();
    engine.drain().await;

    let mut options = RetrievalOptions::default();
    options.min_similarity = 0.0;
    let response = engine
        .retrieve("u1", "enjoys painting tiny miniatures", &options)
        .await
        .unwrap();

    assert_eq!(response.results[0].id, new);
    let old_item = response.results.iter().find(|r| r.id == old).unwrap();
    assert!((old_item.temporal_weight - 0.25).abs() < 0.01);
}

#[tokio::test]
async fn fifty_concurrent_ingests_leave_a_healthy_index() {
    let (engine, store) = engine();
    let engine = Arc::new(engine);

    let mut handles = Vec::new();
    for i in 0..50 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine.ingest(memory(
                "u1",
                &format!("memory number {i} about topic {}", i % 7),
                now(),
                0.5,
            ))
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    engine.drain().await;

    assert_eq!(engine.node_count(), 50);
    assert!(engine.health_check().unwrap().healthy());
    assert_eq!(store.load_embedded().unwrap().len(), 50);
}

#[tokio::test]
async fn repeated_query_is_served_from_the_result_cache() {
    let (engine, _store) = engine();
    ingest_dessert_corpus(&engine).await;

    let options = RetrievalOptions::default();
    let first = engine
        .retrieve("u1", "chocolate dessert", &options)
        .await
        .unwrap();

    // New data after the first query: a live re-run would surface it,
    // the cached response must not.
    engine
        .ingest(memory("u1", "chocolate fondue with friends", now(), 0.9))
        .unwrap();
    engine.drain().await;

    let second = engine
        .retrieve("u1", "chocolate dessert", &options)
        .await
        .unwrap();

    let first_ids: Vec<i64> = first.results.iter().map(|r| r.id).collect();
    let second_ids: Vec<i64> = second.results.iter().map(|r| r.id).collect();
    assert_eq!(first_ids, second_ids);
}

#[tokio::test]
async fn restart_reloads_the_index_from_the_store() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());

    {
        let engine = MemoryEngine::new(
            EngineConfig::default(),
            Arc::clone(&store) as Arc<dyn MemoryStore>,
            Arc::new(HashEmbeddingClient::new()),
            DurableCache::in_memory(),
        )
        .unwrap();
        engine
            .ingest(memory("u1", "collects vintage postcards", now(), 0.7))
            .unwrap();
        engine
            .ingest(memory("u1", "allergic to peanuts", now(), 0.9))
            .unwrap();
        engine.drain().await;
    }

    // Fresh engine over the same store: empty until the startup load.
    let engine = MemoryEngine::new(
        EngineConfig::default(),
        Arc::clone(&store) as Arc<dyn MemoryStore>,
        Arc::new(HashEmbeddingClient::new()),
        DurableCache::in_memory(),
    )
    .unwrap();
    assert_eq!(engine.node_count(), 0);
    assert_eq!(engine.load_from_store().unwrap(), 2);
    assert_eq!(engine.node_count(), 2);

    let mut options = RetrievalOptions::default();
    options.min_similarity = 0.0;
    let response = engine
        .retrieve("u1", "collects vintage postcards", &options)
        .await
        .unwrap();
    assert!(!response.results.is_empty());
    assert_eq!(response.results[0].content, "collects vintage postcards");
}

#[tokio::test]
async fn failed_embedding_marks_the_row_without_failing_ingest() {
    struct RefusingClient;

    #[async_trait]
    impl EmbeddingClient for RefusingClient {
        async fn embed(&self, _prompt: &str) -> EngramResult<Vec<f32>> {
            Err(engram_core::EngramError::embedding("model offline"))
        }

        fn model_name(&self) -> &str {
            "refusing"
        }
    }

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let engine = MemoryEngine::new(
        EngineConfig::default(),
        Arc::clone(&store) as Arc<dyn MemoryStore>,
        Arc::new(RefusingClient),
        DurableCache::in_memory(),
    )
    .unwrap();

    // Ingest succeeds even though embedding will fail.
    engine
        .ingest(memory("u1", "this will never embed", now(), 0.5))
        .unwrap();
    engine.drain().await;

    assert_eq!(engine.node_count(), 0);
    assert!(store.load_embedded().unwrap().is_empty());
}

#[tokio::test]
async fn packed_context_respects_the_budget() {
    let (engine, _store) = engine();
    for i in 0..8 {
        engine
            .ingest(memory(
                "u1",
                &format!("chocolate memory {i}: a fairly long sentence about dessert preferences"),
                now(),
                0.6,
            ))
            .unwrap();
    }
    engine.drain().await;

    let mut options = RetrievalOptions::default();
    options.min_similarity = 0.0;
    let response = engine
        .retrieve("u1", "chocolate dessert preferences", &options)
        .await
        .unwrap();
    assert!(!response.results.is_empty());

    let packed = engine.pack_context(&response, Some(40));
    assert!(packed.estimated_tokens <= 40);
    assert!(!packed.selected.is_empty());
    assert!(packed.selected.len() < response.results.len());
}

#[tokio::test]
async fn metadata_round_trips_through_retrieval() {
    let (engine, _store) = engine();
    let mut m = memory("u1", "favorite flower is the peony", now(), 0.5);
    m.metadata = Some(serde_json::json!({ "source": "chat", "turn": 42 }));
    engine.ingest(m).unwrap();
    engine.drain().await;

    let mut options = RetrievalOptions::default();
    options.min_similarity = 0.0;
    let response = engine
        .retrieve("u1", "favorite flower is the peony", &options)
        .await
        .unwrap();
    let item = &response.results[0];
    assert_eq!(item.metadata.as_ref().unwrap()["source"], "chat");

    // Same query with metadata stripped.
    let mut bare = options.clone();
    bare.include_metadata = false;
    let response = engine
        .retrieve("u1", "favorite flower is the peony", &bare)
        .await
        .unwrap();
    assert!(response.results[0].metadata.is_none());
}
