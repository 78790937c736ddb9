//! The SQLite memory store.
//!
//! The embedding column holds both forms: a 3072-byte little-endian blob
//! (fast path) and a JSON float array (canonical). Retrieval-path decode
//! prefers the blob and falls back to the array.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::{debug, warn};

use engram_core::models::{EmbeddingStatus, MemoryRecord, NewMemory};
use engram_core::traits::MemoryStore;
use engram_core::vector;
use engram_core::{EngramError, EngramResult};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS memories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    character_id TEXT,
    content TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    importance REAL NOT NULL DEFAULT 0.5,
    emotional_weight REAL NOT NULL DEFAULT 0.0,
    metadata TEXT,
    embedding BLOB,
    embedding_json TEXT,
    status TEXT NOT NULL DEFAULT 'pending'
);
CREATE INDEX IF NOT EXISTS idx_memories_user ON memories(user_id);
CREATE INDEX IF NOT EXISTS idx_memories_status ON memories(status);";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn sql_err(e: rusqlite::Error) -> EngramError {
    EngramError::store(e.to_string())
}

impl SqliteStore {
    /// Open a file-backed store.
    pub fn open(path: &Path) -> EngramResult<Self> {
        let conn = Connection::open(path).map_err(sql_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
            .map_err(sql_err)?;
        Self::initialize(conn)
    }

    /// Open an in-memory store (tests, ephemeral sessions).
    pub fn open_in_memory() -> EngramResult<Self> {
        let conn = Connection::open_in_memory().map_err(sql_err)?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> EngramResult<Self> {
        conn.execute_batch(SCHEMA).map_err(sql_err)?;
        debug!("memory store schema ready");
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> EngramResult<T>) -> EngramResult<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| EngramError::store("store lock poisoned"))?;
        f(&conn)
    }

    /// Decode a row's embedding: blob first, JSON array second.
    fn decode_embedding(
        id: i64,
        blob: Option<Vec<u8>>,
        json: Option<String>,
    ) -> Option<Vec<f32>> {
        if let Some(bytes) = blob {
            match vector::decode(&bytes) {
                Ok(vec) => return Some(vec),
                Err(e) => warn!(id, error = %e, "embedding blob malformed, trying array form"),
            }
        }
        if let Some(text) = json {
            match serde_json::from_str::<Vec<f32>>(&text) {
                Ok(vec) => return Some(vec),
                Err(e) => warn!(id, error = %e, "embedding array form malformed"),
            }
        }
        None
    }
}

impl MemoryStore for SqliteStore {
    fn insert(&self, memory: &NewMemory) -> EngramResult<i64> {
        memory.validate()?;
        let metadata = match &memory.metadata {
            Some(value) => Some(
                serde_json::to_string(value)
                    .map_err(|e| EngramError::store(format!("metadata serialize: {e}")))?,
            ),
            None => None,
        };
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO memories
                    (user_id, character_id, content, created_at, importance,
                     emotional_weight, metadata, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending')",
                params![
                    memory.user_id,
                    memory.character_id,
                    memory.content,
                    memory.created_at,
                    memory.importance,
                    memory.emotional_weight,
                    metadata,
                ],
            )
            .map_err(sql_err)?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn load_embedded(&self) -> EngramResult<Vec<MemoryRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, user_id, character_id, content, created_at, importance,
                            emotional_weight, metadata, embedding, embedding_json, status
                     FROM memories
                     WHERE embedding IS NOT NULL OR embedding_json IS NOT NULL",
                )
                .map_err(sql_err)?;

            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, f64>(5)?,
                        row.get::<_, f64>(6)?,
                        row.get::<_, Option<String>>(7)?,
                        row.get::<_, Option<Vec<u8>>>(8)?,
                        row.get::<_, Option<String>>(9)?,
                        row.get::<_, String>(10)?,
                    ))
                })
                .map_err(sql_err)?;

            let mut records = Vec::new();
            for row in rows {
                let (
                    id,
                    user_id,
                    character_id,
                    content,
                    created_at,
                    importance,
                    emotional_weight,
                    metadata_text,
                    blob,
                    json,
                    status_text,
                ) = row.map_err(sql_err)?;

                let Some(embedding) = Self::decode_embedding(id, blob, json) else {
                    warn!(id, "embedded row has no decodable vector, skipping");
                    continue;
                };
                let metadata = metadata_text.and_then(|t| serde_json::from_str(&t).ok());

                records.push(MemoryRecord {
                    id,
                    user_id,
                    character_id,
                    content,
                    created_at,
                    importance: importance as f32,
                    emotional_weight: emotional_weight as f32,
                    metadata,
                    embedding: Some(embedding),
                    status: EmbeddingStatus::parse(&status_text)?,
                });
            }
            debug!(rows = records.len(), "loaded embedded memories");
            Ok(records)
        })
    }

    fn complete_embedding(&self, id: i64, embedding: &[f32]) -> EngramResult<()> {
        let blob = vector::encode(embedding);
        let json = serde_json::to_string(embedding)
            .map_err(|e| EngramError::store(format!("embedding serialize: {e}")))?;
        self.with_conn(|conn| {
            let updated = conn
                .execute(
                    "UPDATE memories
                     SET embedding = ?1, embedding_json = ?2, status = 'completed'
                     WHERE id = ?3",
                    params![blob, json, id],
                )
                .map_err(sql_err)?;
            if updated == 0 {
                return Err(EngramError::store(format!("no memory row with id {id}")));
            }
            Ok(())
        })
    }

    fn fail_embedding(&self, id: i64) -> EngramResult<()> {
        self.with_conn(|conn| {
            let updated = conn
                .execute(
                    "UPDATE memories SET status = 'failed' WHERE id = ?1",
                    params![id],
                )
                .map_err(sql_err)?;
            if updated == 0 {
                return Err(EngramError::store(format!("no memory row with id {id}")));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_core::constants::EMBEDDING_DIM;

    fn new_memory(content: &str) -> NewMemory {
        NewMemory {
            user_id: "u1".to_string(),
            character_id: None,
            content: content.to_string(),
            created_at: 1000,
            importance: 0.8,
            emotional_weight: 0.2,
            metadata: Some(serde_json::json!({ "topic": "food" })),
        }
    }

    fn unit_vec() -> Vec<f32> {
        vector::normalize((0..EMBEDDING_DIM).map(|i| (i as f32 * 0.37).cos()).collect())
    }

    #[test]
    fn insert_assigns_increasing_ids() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.insert(&new_memory("first")).unwrap();
        let b = store.insert(&new_memory("second")).unwrap();
        assert!(b > a);
    }

    #[test]
    fn empty_content_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut m = new_memory("x");
        m.content = "   ".to_string();
        assert!(matches!(
            store.insert(&m).unwrap_err(),
            EngramError::InvalidArgument { .. }
        ));
    }

    #[test]
    fn pending_rows_not_loaded() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(&new_memory("no embedding yet")).unwrap();
        assert!(store.load_embedded().unwrap().is_empty());
    }

    #[test]
    fn complete_then_load_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert(&new_memory("remember me")).unwrap();
        let v = unit_vec();
        store.complete_embedding(id, &v).unwrap();

        let rows = store.load_embedded().unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.id, id);
        assert_eq!(row.status, EmbeddingStatus::Completed);
        assert_eq!(row.embedding.as_deref(), Some(v.as_slice()));
        assert_eq!(row.metadata.as_ref().unwrap()["topic"], "food");
        row.validate().unwrap();
    }

    #[test]
    fn blob_is_preferred_over_array_form() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert(&new_memory("dual form")).unwrap();
        let v = unit_vec();
        store.complete_embedding(id, &v).unwrap();

        // Corrupt the JSON form; the blob must win.
        store
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE memories SET embedding_json = '[0.0]' WHERE id = ?1",
                    params![id],
                )
                .map_err(sql_err)?;
                Ok(())
            })
            .unwrap();

        let rows = store.load_embedded().unwrap();
        assert_eq!(rows[0].embedding.as_deref(), Some(v.as_slice()));
    }

    #[test]
    fn array_form_is_fallback_when_blob_missing() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert(&new_memory("json only")).unwrap();
        let v = unit_vec();
        store.complete_embedding(id, &v).unwrap();

        store
            .with_conn(|conn| {
                conn.execute("UPDATE memories SET embedding = NULL WHERE id = ?1", params![id])
                    .map_err(sql_err)?;
                Ok(())
            })
            .unwrap();

        let rows = store.load_embedded().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].embedding.as_deref(), Some(v.as_slice()));
    }

    #[test]
    fn failed_rows_marked_and_excluded() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert(&new_memory("will fail")).unwrap();
        store.fail_embedding(id).unwrap();
        assert!(store.load_embedded().unwrap().is_empty());
    }

    #[test]
    fn unknown_id_update_is_store_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(
            store.complete_embedding(424242, &unit_vec()).unwrap_err(),
            EngramError::Store { .. }
        ));
    }

    #[test]
    fn rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memories.db");
        let v = unit_vec();

        {
            let store = SqliteStore::open(&path).unwrap();
            let id = store.insert(&new_memory("durable")).unwrap();
            store.complete_embedding(id, &v).unwrap();
        }
        {
            let store = SqliteStore::open(&path).unwrap();
            let rows = store.load_embedded().unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].content, "durable");
            assert_eq!(rows[0].embedding.as_deref(), Some(v.as_slice()));
        }
    }
}
