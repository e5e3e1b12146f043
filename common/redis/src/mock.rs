use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use crate::{Client, CustomRedisError};

/// In-memory stand-in for Redis.
///
/// Values written through `set_ex` are kept until their TTL elapses on tokio's
/// clock, so tests running with a paused runtime can move through expiry windows
/// with `tokio::time::advance`. Canned results and blanket failures can be
/// injected per operation, and every call is recorded.
#[derive(Clone, Default)]
pub struct MockRedisClient {
    entries: Arc<Mutex<HashMap<String, (String, Instant)>>>,
    get_ret: HashMap<String, Result<String, CustomRedisError>>,
    set_ret: HashMap<String, Result<(), CustomRedisError>>,
    get_error: Option<CustomRedisError>,
    set_error: Option<CustomRedisError>,
    calls: Arc<Mutex<Vec<MockRedisCall>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MockRedisValue {
    None,
    StringWithTTL(String, u64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockRedisCall {
    pub op: String,
    pub key: String,
    pub value: MockRedisValue,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl MockRedisClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed result for `get` on one key, bypassing the in-memory store.
    pub fn get_ret(&mut self, key: &str, ret: Result<String, CustomRedisError>) -> Self {
        self.get_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    /// Fixed result for `set_ex` on one key; an `Ok` still stores the value.
    pub fn set_ret(&mut self, key: &str, ret: Result<(), CustomRedisError>) -> Self {
        self.set_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    /// Every `get` fails with `err`.
    pub fn get_error(&mut self, err: CustomRedisError) -> Self {
        self.get_error = Some(err);
        self.clone()
    }

    /// Every `set_ex` fails with `err`.
    pub fn set_error(&mut self, err: CustomRedisError) -> Self {
        self.set_error = Some(err);
        self.clone()
    }

    pub fn get_calls(&self) -> Vec<MockRedisCall> {
        lock(&self.calls).clone()
    }

    /// Number of keys currently stored and not yet expired.
    pub fn live_keys(&self) -> usize {
        let now = Instant::now();
        lock(&self.entries)
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }

    fn record(&self, op: &str, key: &str, value: MockRedisValue) {
        lock(&self.calls).push(MockRedisCall {
            op: op.to_string(),
            key: key.to_string(),
            value,
        });
    }
}

#[async_trait]
impl Client for MockRedisClient {
    async fn get(&self, key: String) -> Result<String, CustomRedisError> {
        self.record("get", &key, MockRedisValue::None);

        if let Some(err) = &self.get_error {
            return Err(err.clone());
        }
        if let Some(ret) = self.get_ret.get(&key) {
            return ret.clone();
        }

        let mut entries = lock(&self.entries);
        match entries.get(&key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(value.clone()),
            Some(_) => {
                entries.remove(&key);
                Err(CustomRedisError::NotFound)
            }
            None => Err(CustomRedisError::NotFound),
        }
    }

    async fn set_ex(
        &self,
        key: String,
        value: String,
        seconds: u64,
    ) -> Result<(), CustomRedisError> {
        self.record(
            "set_ex",
            &key,
            MockRedisValue::StringWithTTL(value.clone(), seconds),
        );

        if let Some(err) = &self.set_error {
            return Err(err.clone());
        }
        if let Some(Err(err)) = self.set_ret.get(&key) {
            return Err(err.clone());
        }

        let expires_at = Instant::now() + Duration::from_secs(seconds);
        lock(&self.entries).insert(key, (value, expires_at));
        Ok(())
    }
}
