use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::{mpsc, watch};

use crate::error::DedupError;
use crate::transport::{IngestMessage, MessageSource, MessageStream, Publisher};

#[derive(Default)]
struct State {
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<IngestMessage>>>,
    published: Vec<(String, Bytes)>,
    failing_subscriptions: HashSet<String>,
    failing_publishes: HashSet<String>,
    paused_publishes: HashMap<String, watch::Sender<bool>>,
}

/// In-process transport used to drive the relay in tests.
///
/// Subscriptions are unbounded like a NATS client's own buffer, so emitting
/// never blocks the caller. Publishing to a paused topic waits until the
/// topic is resumed, which lets tests hold one category's dispatch loop.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<State>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Deliver a message to every live subscription of `topic`, returning how many received it.
    pub fn emit(&self, topic: &str, payload: impl Into<Bytes>) -> usize {
        let payload = payload.into();
        let mut state = self.lock();
        let Some(subscribers) = state.subscribers.get_mut(topic) else {
            return 0;
        };
        subscribers.retain(|tx| !tx.is_closed());
        subscribers
            .iter()
            .filter(|tx| tx.send(IngestMessage::new(topic, payload.clone())).is_ok())
            .count()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.lock()
            .subscribers
            .get(topic)
            .map_or(0, |subscribers| {
                subscribers.iter().filter(|tx| !tx.is_closed()).count()
            })
    }

    /// Ends every subscription stream.
    pub fn close_subscriptions(&self) {
        self.lock().subscribers.clear();
    }

    pub fn fail_subscriptions_to(&self, topic: &str) {
        self.lock().failing_subscriptions.insert(topic.to_string());
    }

    pub fn fail_publishes_to(&self, topic: &str) {
        self.lock().failing_publishes.insert(topic.to_string());
    }

    pub fn pause_publishing(&self, topic: &str) {
        let mut state = self.lock();
        match state.paused_publishes.get(topic) {
            Some(tx) => {
                tx.send_replace(true);
            }
            None => {
                let (tx, _) = watch::channel(true);
                state.paused_publishes.insert(topic.to_string(), tx);
            }
        }
    }

    pub fn resume_publishing(&self, topic: &str) {
        if let Some(tx) = self.lock().paused_publishes.get(topic) {
            tx.send_replace(false);
        }
    }

    /// Payloads published to `topic`, in publish order.
    pub fn published(&self, topic: &str) -> Vec<Bytes> {
        self.lock()
            .published
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Polls until `topic` has at least `count` publications or `timeout` elapses.
    pub async fn wait_for_published(
        &self,
        topic: &str,
        count: usize,
        timeout: Duration,
    ) -> Vec<Bytes> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let published = self.published(topic);
            if published.len() >= count || tokio::time::Instant::now() >= deadline {
                return published;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl MessageSource for MemoryTransport {
    async fn subscribe(&self, topic: &str) -> Result<MessageStream, DedupError> {
        let mut state = self.lock();
        if state.failing_subscriptions.contains(topic) {
            return Err(DedupError::Subscribe {
                topic: topic.to_string(),
                reason: "subscription rejected".to_string(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state
            .subscribers
            .entry(topic.to_string())
            .or_default()
            .push(tx);

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });
        Ok(stream.boxed())
    }
}

#[async_trait]
impl Publisher for MemoryTransport {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), DedupError> {
        let pause = self
            .lock()
            .paused_publishes
            .get(topic)
            .map(|tx| tx.subscribe());
        if let Some(mut paused) = pause {
            // Err only once the transport itself has been dropped.
            if paused.wait_for(|paused| !*paused).await.is_err() {
                return Ok(());
            }
        }

        let mut state = self.lock();
        if state.failing_publishes.contains(topic) {
            return Err(DedupError::Publish {
                topic: topic.to_string(),
                reason: "publish rejected".to_string(),
            });
        }
        state.published.push((topic.to_string(), payload));
        Ok(())
    }
}
