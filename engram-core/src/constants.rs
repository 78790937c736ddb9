/// Engram system version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Dimensionality of every embedding vector in the system.
pub const EMBEDDING_DIM: usize = 768;

/// Bytes per encoded embedding blob: 768 little-endian f32s, no header.
pub const EMBEDDING_BLOB_BYTES: usize = EMBEDDING_DIM * 4;

/// Tolerance for the unit-norm invariant on stored vectors.
pub const UNIT_NORM_EPSILON: f32 = 1e-6;

/// Durable embedding-cache entries older than this are treated as absent.
pub const DURABLE_CACHE_TTL_SECS: i64 = 30 * 86_400;

/// Number of long tokens hashed into the semantic cache key.
pub const SEMANTIC_KEY_TOKENS: usize = 20;

/// Tokens shorter than this are excluded from the semantic cache key.
pub const SEMANTIC_KEY_MIN_TOKEN_LEN: usize = 4;
