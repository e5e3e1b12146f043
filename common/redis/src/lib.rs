use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

// Re-exported so consumers can construct CustomRedisError in tests
pub use redis::ErrorKind as RedisErrorKind;
pub use redis::{ConnectionAddr, ConnectionInfo, IntoConnectionInfo};

#[derive(Error, Debug, Clone)]
pub enum CustomRedisError {
    #[error("Not found in redis")]
    NotFound,
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Timeout error")]
    Timeout,
    #[error(transparent)]
    Redis(#[from] Arc<redis::RedisError>),
}

impl From<redis::RedisError> for CustomRedisError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            CustomRedisError::Timeout
        } else {
            CustomRedisError::Redis(Arc::new(err))
        }
    }
}

impl CustomRedisError {
    /// Create a Redis error from an ErrorKind (primarily for testing)
    pub fn from_redis_kind(kind: redis::ErrorKind, description: &'static str) -> Self {
        CustomRedisError::Redis(Arc::new(redis::RedisError::from((kind, description))))
    }

    /// True when the key simply does not exist, as opposed to the backend failing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CustomRedisError::NotFound)
    }
}

/// Minimal key-value capability used by the deduplication cache.
///
/// Implementations must be safe to share between tasks; callers hold them as
/// `Arc<dyn Client + Send + Sync>` and issue commands concurrently.
#[async_trait]
pub trait Client {
    /// Returns the stored value, or `CustomRedisError::NotFound` when the key is absent.
    async fn get(&self, k: String) -> Result<String, CustomRedisError>;

    /// Stores `v` under `k` with an expiry of `seconds`, overwriting any previous value.
    async fn set_ex(&self, k: String, v: String, seconds: u64) -> Result<(), CustomRedisError>;
}

mod client;
mod mock;

pub use client::RedisClient;
pub use mock::{MockRedisCall, MockRedisClient, MockRedisValue};
