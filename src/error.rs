//! Error types for the cache engine

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the cache engine.
///
/// Only [`Error::OriginFetchFailed`] and [`Error::EntryTooLarge`] are ever
/// returned from the engine's read and write paths. Everything else is
/// absorbed internally, logged and counted.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Payload does not fit the local store or the policy's entry ceiling
    #[error("Entry {key} too large: {size} bytes exceeds limit of {limit} bytes")]
    EntryTooLarge { key: String, size: u64, limit: u64 },

    /// Distributed tier unreachable or timed out
    #[error("Distributed tier unavailable: {0}")]
    DistributedUnavailable(String),

    /// The caller-supplied origin fetch failed
    #[error("Origin fetch failed for {key}: {source}")]
    OriginFetchFailed {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// Persisted snapshot could not be read or parsed
    #[error("Persisted snapshot corrupt: {0}")]
    PersistenceCorrupt(String),

    /// Value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // =========================================================================
    // Compression Errors
    // =========================================================================
    /// Compression failed
    #[error("Compression with {algorithm} failed: {reason}")]
    CompressionFailed { algorithm: String, reason: String },

    /// Decompression failed
    #[error("Decompression with {algorithm} failed: {reason}")]
    DecompressionFailed { algorithm: String, reason: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error is one the engine surfaces to calling code
    pub fn is_caller_visible(&self) -> bool {
        matches!(
            self,
            Error::EntryTooLarge { .. } | Error::OriginFetchFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_visible_errors() {
        let too_large = Error::EntryTooLarge {
            key: "products:p1".into(),
            size: 10,
            limit: 5,
        };
        assert!(too_large.is_caller_visible());

        let origin = Error::OriginFetchFailed {
            key: "products:p1".into(),
            source: anyhow::anyhow!("db down"),
        };
        assert!(origin.is_caller_visible());

        assert!(!Error::DistributedUnavailable("timeout".into()).is_caller_visible());
        assert!(!Error::PersistenceCorrupt("bad json".into()).is_caller_visible());
    }

    #[test]
    fn test_error_display() {
        let err = Error::EntryTooLarge {
            key: "orders:detail:O1".into(),
            size: 2048,
            limit: 1024,
        };
        assert_eq!(
            err.to_string(),
            "Entry orders:detail:O1 too large: 2048 bytes exceeds limit of 1024 bytes"
        );
    }
}
