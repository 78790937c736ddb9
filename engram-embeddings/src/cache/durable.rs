//! L0 durable embedding cache backed by SQLite.
//!
//! Survives process restarts. When opening the database fails the tier
//! is disabled and lookups fall through silently; callers that require
//! durability can check `is_available`.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::{debug, warn};

use engram_core::constants::DURABLE_CACHE_TTL_SECS;
use engram_core::vector;

pub struct DurableCache {
    conn: Option<Mutex<Connection>>,
    ttl_secs: i64,
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS embedding_cache (
    hash TEXT PRIMARY KEY,
    model TEXT NOT NULL,
    embedding BLOB NOT NULL,
    created_at INTEGER NOT NULL,
    last_access INTEGER NOT NULL
);
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;";

impl DurableCache {
    /// Open a file-backed durable cache. A failed open produces a
    /// disabled tier, not an error.
    pub fn open(path: &Path) -> Self {
        match Connection::open(path) {
            Ok(conn) => match conn.execute_batch(SCHEMA) {
                Ok(()) => {
                    debug!(path = %path.display(), "durable embedding cache opened");
                    Self {
                        conn: Some(Mutex::new(conn)),
                        ttl_secs: DURABLE_CACHE_TTL_SECS,
                    }
                }
                Err(e) => {
                    warn!(error = %e, "durable cache schema failed, tier disabled");
                    Self::disabled()
                }
            },
            Err(e) => {
                warn!(error = %e, "durable cache open failed, tier disabled");
                Self::disabled()
            }
        }
    }

    /// In-memory durable tier for tests: behaves like the file-backed
    /// tier but vanishes with the process.
    pub fn in_memory() -> Self {
        match Connection::open_in_memory() {
            Ok(conn) => {
                let _ = conn.execute_batch(SCHEMA);
                Self {
                    conn: Some(Mutex::new(conn)),
                    ttl_secs: DURABLE_CACHE_TTL_SECS,
                }
            }
            Err(_) => Self::disabled(),
        }
    }

    /// A permanently-offline tier.
    pub fn disabled() -> Self {
        Self { conn: None, ttl_secs: DURABLE_CACHE_TTL_SECS }
    }

    #[cfg(test)]
    fn with_ttl(mut self, ttl_secs: i64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    pub fn is_available(&self) -> bool {
        self.conn.is_some()
    }

    /// Look up an embedding. Entries older than the TTL are treated as
    /// absent. A hit refreshes `last_access`.
    pub fn get(&self, hash: &str, now: i64) -> Option<Vec<f32>> {
        let conn_mutex = self.conn.as_ref()?;
        let conn = conn_mutex.lock().ok()?;
        let row: Result<(Vec<u8>, i64), _> = conn.query_row(
            "SELECT embedding, created_at FROM embedding_cache WHERE hash = ?1",
            params![hash],
            |row| Ok((row.get(0)?, row.get(1)?)),
        );
        let (blob, created_at) = row.ok()?;
        if now - created_at > self.ttl_secs {
            return None;
        }
        let _ = conn.execute(
            "UPDATE embedding_cache SET last_access = ?1 WHERE hash = ?2",
            params![now, hash],
        );
        vector::decode(&blob).ok()
    }

    /// Upsert an embedding. Best-effort: failures are reported to the
    /// caller for retry accounting but never propagate further.
    pub fn insert(&self, hash: &str, model: &str, embedding: &[f32], now: i64) -> bool {
        let Some(conn_mutex) = self.conn.as_ref() else {
            return false;
        };
        let Ok(conn) = conn_mutex.lock() else {
            return false;
        };
        let blob = vector::encode(embedding);
        conn.execute(
            "INSERT INTO embedding_cache (hash, model, embedding, created_at, last_access)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(hash) DO UPDATE SET
                embedding = excluded.embedding,
                model = excluded.model,
                last_access = excluded.last_access",
            params![hash, model, blob, now],
        )
        .is_ok()
    }

    pub fn len(&self) -> usize {
        let Some(conn_mutex) = self.conn.as_ref() else {
            return 0;
        };
        let Ok(conn) = conn_mutex.lock() else {
            return 0;
        };
        conn.query_row("SELECT COUNT(*) FROM embedding_cache", [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|n| n as usize)
        .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
