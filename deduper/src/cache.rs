use std::sync::Arc;
use std::time::Duration;

use common_redis::Client;
use tracing::warn;

use crate::error::DedupError;

/// Value stored under every fingerprint; only the key's presence matters.
pub const SEEN_SENTINEL: &str = "1";

/// Outcome of [`SeenCache::check_and_record`].
#[derive(Debug)]
pub enum SeenStatus {
    /// The key was already present: drop the message.
    Duplicate,
    /// The key was absent and is now recorded for the TTL window.
    Recorded,
    /// The key was absent but recording it failed. The next sighting will
    /// be forwarded again.
    RecordFailed(DedupError),
    /// The backend could not answer, so the message is treated as new (fail-open).
    /// `write` holds the error of the best-effort record attempt, if it failed too.
    ReadFailed {
        read: DedupError,
        write: Option<DedupError>,
    },
}

impl SeenStatus {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, SeenStatus::Duplicate)
    }

    pub fn is_fail_open(&self) -> bool {
        matches!(self, SeenStatus::ReadFailed { .. })
    }
}

/// A TTL-windowed set of fingerprints kept in an external key-value store.
///
/// Windows are fixed from the first sighting: hitting an existing key never
/// refreshes its TTL. Concurrent first sightings of one key may both be
/// forwarded; the later write just overwrites the sentinel.
#[derive(Clone)]
pub struct SeenCache {
    client: Arc<dyn Client + Send + Sync>,
    ttl_secs: u64,
}

impl SeenCache {
    /// `ttl` is kept in whole seconds, at least one; the backend rejects a zero expiry.
    pub fn new(client: Arc<dyn Client + Send + Sync>, ttl: Duration) -> Self {
        Self {
            client,
            ttl_secs: ttl.as_secs().max(1),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub async fn check_and_record(&self, key: &str) -> SeenStatus {
        match self.client.get(key.to_string()).await {
            Ok(_) => SeenStatus::Duplicate,
            Err(e) if e.is_not_found() => match self.record(key).await {
                Ok(()) => SeenStatus::Recorded,
                Err(write) => SeenStatus::RecordFailed(write),
            },
            Err(source) => {
                warn!(key, error = ?source, "cache read failed, forwarding message");
                let read = DedupError::CacheRead {
                    key: key.to_string(),
                    source,
                };
                let write = self.record(key).await.err();
                SeenStatus::ReadFailed { read, write }
            }
        }
    }

    async fn record(&self, key: &str) -> Result<(), DedupError> {
        self.client
            .set_ex(key.to_string(), SEEN_SENTINEL.to_string(), self.ttl_secs)
            .await
            .map_err(|source| {
                warn!(key, error = ?source, "failed to record key in cache");
                DedupError::CacheWrite {
                    key: key.to_string(),
                    source,
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_redis::{CustomRedisError, MockRedisClient, MockRedisValue, RedisErrorKind};

    fn cache(client: &MockRedisClient) -> SeenCache {
        SeenCache::new(Arc::new(client.clone()), Duration::from_secs(500))
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_sighting_is_recorded_then_duplicate() {
        let client = MockRedisClient::new();
        let cache = cache(&client);

        assert!(matches!(
            cache.check_and_record("k").await,
            SeenStatus::Recorded
        ));
        assert!(cache.check_and_record("k").await.is_duplicate());

        let calls = client.get_calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1].op, "set_ex");
        assert_eq!(
            calls[1].value,
            MockRedisValue::StringWithTTL(SEEN_SENTINEL.to_string(), 500)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sub_second_ttl_is_raised_to_one_second() {
        let client = MockRedisClient::new();
        let cache = SeenCache::new(Arc::new(client.clone()), Duration::from_millis(200));
        assert_eq!(cache.ttl(), Duration::from_secs(1));

        assert!(matches!(
            cache.check_and_record("k").await,
            SeenStatus::Recorded
        ));
        assert!(cache.check_and_record("k").await.is_duplicate());
        assert_eq!(
            client.get_calls()[1].value,
            MockRedisValue::StringWithTTL(SEEN_SENTINEL.to_string(), 1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_does_not_refresh_ttl() {
        let client = MockRedisClient::new();
        let cache = cache(&client);

        assert!(!cache.check_and_record("k").await.is_duplicate());
        tokio::time::advance(Duration::from_secs(400)).await;
        assert!(cache.check_and_record("k").await.is_duplicate());
        tokio::time::advance(Duration::from_secs(101)).await;
        assert!(!cache.check_and_record("k").await.is_duplicate());

        let set_calls = client
            .get_calls()
            .into_iter()
            .filter(|c| c.op == "set_ex")
            .count();
        assert_eq!(set_calls, 2);
    }

    #[tokio::test]
    async fn test_read_failure_fails_open_and_still_records() {
        let client = MockRedisClient::new().get_error(CustomRedisError::Timeout);
        let cache = cache(&client);

        let status = cache.check_and_record("k").await;
        assert!(!status.is_duplicate());
        assert!(status.is_fail_open());
        match status {
            SeenStatus::ReadFailed { read, write } => {
                assert_eq!(read.kind(), "cache_read");
                assert!(write.is_none());
            }
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(client.live_keys(), 1);
    }

    #[tokio::test]
    async fn test_read_and_write_failures_are_both_reported() {
        let client = MockRedisClient::new()
            .get_error(CustomRedisError::from_redis_kind(
                RedisErrorKind::IoError,
                "connection refused",
            ))
            .set_error(CustomRedisError::Timeout);
        let cache = cache(&client);

        for _ in 0..3 {
            match cache.check_and_record("k").await {
                SeenStatus::ReadFailed {
                    read,
                    write: Some(write),
                } => {
                    assert_eq!(read.kind(), "cache_read");
                    assert_eq!(write.kind(), "cache_write");
                }
                other => panic!("unexpected status {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_write_failure_after_miss_is_not_duplicate() {
        let client = MockRedisClient::new().set_error(CustomRedisError::Timeout);
        let cache = cache(&client);

        let status = cache.check_and_record("k").await;
        assert!(matches!(status, SeenStatus::RecordFailed(ref e) if e.kind() == "cache_write"));
        assert!(!cache.check_and_record("k").await.is_duplicate());
    }
}
