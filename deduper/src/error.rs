use common_redis::CustomRedisError;
use thiserror::Error;

use crate::category::Category;

/// Per-message failures of the relay. None of these stop a dispatch loop;
/// they are logged, counted and surfaced in reports so callers can assert on the kind.
#[derive(Error, Debug)]
pub enum DedupError {
    #[error("failed to decode {category} payload")]
    Decode {
        category: Category,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode normalized {category} record")]
    Encode {
        category: Category,
        #[source]
        source: serde_json::Error,
    },
    #[error("cache read failed for key {key}")]
    CacheRead {
        key: String,
        #[source]
        source: CustomRedisError,
    },
    #[error("cache write failed for key {key}")]
    CacheWrite {
        key: String,
        #[source]
        source: CustomRedisError,
    },
    #[error("failed to publish to {topic}: {reason}")]
    Publish { topic: String, reason: String },
    #[error("failed to subscribe to {topic}: {reason}")]
    Subscribe { topic: String, reason: String },
}

impl DedupError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DedupError::Decode { .. } => "decode",
            DedupError::Encode { .. } => "encode",
            DedupError::CacheRead { .. } => "cache_read",
            DedupError::CacheWrite { .. } => "cache_write",
            DedupError::Publish { .. } => "publish",
            DedupError::Subscribe { .. } => "subscribe",
        }
    }
}
