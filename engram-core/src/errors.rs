//! Error types shared across the workspace.
//!
//! One enum per failure kind the engine can surface. Subsystems construct
//! these directly; no `anyhow` at the boundaries.

use thiserror::Error;

/// Convenience alias used by every fallible API in the workspace.
pub type EngramResult<T> = Result<T, EngramError>;

/// All error kinds the engine can produce.
#[derive(Debug, Error)]
pub enum EngramError {
    #[error("codec error: {reason}")]
    Codec { reason: String },

    #[error("embedding failed: {reason}")]
    Embedding { reason: String },

    #[error("timeout during {operation}")]
    Timeout { operation: String },

    #[error("store error: {reason}")]
    Store { reason: String },

    #[error("durable cache unavailable")]
    CacheUnavailable,

    #[error("index inconsistency: {details}")]
    IndexInconsistency { details: String },

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },
}

impl EngramError {
    pub fn codec(reason: impl Into<String>) -> Self {
        Self::Codec { reason: reason.into() }
    }

    pub fn embedding(reason: impl Into<String>) -> Self {
        Self::Embedding { reason: reason.into() }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout { operation: operation.into() }
    }

    pub fn store(reason: impl Into<String>) -> Self {
        Self::Store { reason: reason.into() }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument { reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let e = EngramError::codec("blob length 7 not divisible by 4");
        assert_eq!(e.to_string(), "codec error: blob length 7 not divisible by 4");

        let e = EngramError::timeout("embedding request");
        assert_eq!(e.to_string(), "timeout during embedding request");

        assert_eq!(
            EngramError::CacheUnavailable.to_string(),
            "durable cache unavailable"
        );
    }
}
