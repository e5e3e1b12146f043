use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::category::Category;
use crate::engine::DedupEngine;
use crate::error::DedupError;
use crate::metrics_consts::{INTAKE_QUEUE_DEPTH_GAUGE, MESSAGES_RECEIVED_COUNTER};
use crate::transport::{IngestMessage, MessageSource, MessageStream};

/// Default depth of each category's intake queue.
pub const DEFAULT_INTAKE_CAPACITY: usize = 64;

struct Route {
    ingest_topic: String,
    engine: Arc<DedupEngine>,
}

/// Fans in one subscription per category and runs each category on its own tasks.
///
/// Every category gets a bounded queue fed by an intake task and drained by a
/// single dispatch task, so messages of one category are processed in arrival
/// order while a slow or saturated category only ever blocks its own intake.
pub struct IngestionRouter {
    routes: Vec<Route>,
    capacity: usize,
}

impl IngestionRouter {
    pub fn new(capacity: usize) -> Self {
        Self {
            routes: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Dispatch messages from `ingest_topic` to `engine`.
    pub fn route(mut self, ingest_topic: impl Into<String>, engine: Arc<DedupEngine>) -> Self {
        self.routes.push(Route {
            ingest_topic: ingest_topic.into(),
            engine,
        });
        self
    }

    /// Subscribe every route and spawn its tasks.
    ///
    /// A route whose subscription fails is disabled and the others keep running.
    /// Fails only when no route could subscribe.
    pub async fn start(
        self,
        source: Arc<dyn MessageSource + Send + Sync>,
        shutdown: CancellationToken,
    ) -> Result<RouterHandle, DedupError> {
        let mut handle = RouterHandle {
            tasks: Vec::with_capacity(self.routes.len() * 2),
            active: Vec::with_capacity(self.routes.len()),
        };
        let mut last_error = None;

        for route in self.routes {
            let category = route.engine.category();
            let stream = match source.subscribe(&route.ingest_topic).await {
                Ok(stream) => stream,
                Err(e) => {
                    error!(category = %category, error = ?e, "Subscription failed, category disabled");
                    last_error = Some(e);
                    continue;
                }
            };

            let (tx, rx) = mpsc::channel(self.capacity);
            handle
                .tasks
                .push(tokio::spawn(intake(category, stream, tx, shutdown.clone())));
            handle.tasks.push(tokio::spawn(dispatch(route.engine, rx)));
            handle.active.push(category);
            info!(category = %category, topic = %route.ingest_topic, capacity = self.capacity, "Listening");
        }

        match (handle.active.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            _ => Ok(handle),
        }
    }
}

/// Running router tasks.
pub struct RouterHandle {
    tasks: Vec<JoinHandle<()>>,
    active: Vec<Category>,
}

impl RouterHandle {
    /// Categories whose subscription succeeded.
    pub fn active_categories(&self) -> &[Category] {
        &self.active
    }

    /// Waits for every task. After the shutdown token is cancelled, this
    /// returns once each dispatch task has drained its queue.
    pub async fn join(self) {
        for result in futures::future::join_all(self.tasks).await {
            if let Err(e) = result {
                error!(error = ?e, "Router task panicked");
            }
        }
    }
}

async fn intake(
    category: Category,
    mut stream: MessageStream,
    tx: mpsc::Sender<IngestMessage>,
    shutdown: CancellationToken,
) {
    let labels = [("category", category.as_str())];
    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = stream.next() => match next {
                Some(message) => message,
                None => {
                    warn!(category = %category, "Subscription closed");
                    break;
                }
            },
        };
        metrics::counter!(MESSAGES_RECEIVED_COUNTER, &labels).increment(1);

        // Blocks while the queue is full; only this category is held back
        tokio::select! {
            _ = shutdown.cancelled() => break,
            sent = tx.send(message) => if sent.is_err() {
                break;
            },
        }
        let depth = tx.max_capacity() - tx.capacity();
        metrics::gauge!(INTAKE_QUEUE_DEPTH_GAUGE, &labels).set(depth as f64);
    }
    info!(category = %category, "Intake stopped");
}

async fn dispatch(engine: Arc<DedupEngine>, mut rx: mpsc::Receiver<IngestMessage>) {
    while let Some(message) = rx.recv().await {
        engine.process(&message).await;
    }
    info!(category = %engine.category(), "Dispatch drained and stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SeenCache;
    use crate::category::{TopicPair, GOLD_PRICES_INGEST, MAP_DATA_INGEST};
    use crate::normalizer::IdentityNormalizer;
    use crate::transport::MemoryTransport;
    use common_redis::MockRedisClient;
    use std::time::Duration;

    fn engine(category: Category, transport: &MemoryTransport) -> Arc<DedupEngine> {
        Arc::new(DedupEngine::new(
            category,
            TopicPair::defaults(category).deduped,
            Box::new(IdentityNormalizer),
            SeenCache::new(Arc::new(MockRedisClient::new()), Duration::from_secs(500)),
            Arc::new(transport.clone()),
        ))
    }

    #[tokio::test]
    async fn test_messages_of_a_category_keep_arrival_order() {
        let transport = MemoryTransport::new();
        let shutdown = CancellationToken::new();
        let handle = IngestionRouter::new(4)
            .route(GOLD_PRICES_INGEST, engine(Category::GoldPrices, &transport))
            .start(Arc::new(transport.clone()), shutdown.clone())
            .await
            .unwrap();

        for i in 0..50 {
            transport.emit(GOLD_PRICES_INGEST, format!("price-{i}"));
        }

        let topic = TopicPair::defaults(Category::GoldPrices).deduped;
        let published = transport
            .wait_for_published(&topic, 50, Duration::from_secs(5))
            .await;
        let expected: Vec<_> = (0..50).map(|i| format!("price-{i}")).collect();
        let got: Vec<_> = published
            .iter()
            .map(|p| String::from_utf8(p.to_vec()).unwrap())
            .collect();
        assert_eq!(got, expected);

        shutdown.cancel();
        handle.join().await;
    }

    #[tokio::test]
    async fn test_failed_subscription_disables_only_that_category() {
        let transport = MemoryTransport::new();
        transport.fail_subscriptions_to(GOLD_PRICES_INGEST);
        let shutdown = CancellationToken::new();

        let handle = IngestionRouter::new(DEFAULT_INTAKE_CAPACITY)
            .route(GOLD_PRICES_INGEST, engine(Category::GoldPrices, &transport))
            .route(MAP_DATA_INGEST, engine(Category::MapData, &transport))
            .start(Arc::new(transport.clone()), shutdown.clone())
            .await
            .unwrap();
        assert_eq!(handle.active_categories(), &[Category::MapData]);

        transport.emit(MAP_DATA_INGEST, "zone");
        let topic = TopicPair::defaults(Category::MapData).deduped;
        assert_eq!(
            transport
                .wait_for_published(&topic, 1, Duration::from_secs(5))
                .await
                .len(),
            1
        );

        shutdown.cancel();
        handle.join().await;
    }

    #[tokio::test]
    async fn test_all_subscriptions_failing_is_an_error() {
        let transport = MemoryTransport::new();
        transport.fail_subscriptions_to(GOLD_PRICES_INGEST);

        let result = IngestionRouter::new(DEFAULT_INTAKE_CAPACITY)
            .route(GOLD_PRICES_INGEST, engine(Category::GoldPrices, &transport))
            .start(Arc::new(transport.clone()), CancellationToken::new())
            .await;
        assert_eq!(result.err().map(|e| e.kind()), Some("subscribe"));
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_messages() {
        let transport = MemoryTransport::new();
        let topic = TopicPair::defaults(Category::GoldPrices).deduped;
        transport.pause_publishing(&topic);
        let shutdown = CancellationToken::new();

        let handle = IngestionRouter::new(8)
            .route(GOLD_PRICES_INGEST, engine(Category::GoldPrices, &transport))
            .start(Arc::new(transport.clone()), shutdown.clone())
            .await
            .unwrap();

        for i in 0..5 {
            transport.emit(GOLD_PRICES_INGEST, format!("{i}"));
        }
        // Let intake move everything into the queue while dispatch is held
        tokio::time::sleep(Duration::from_millis(50)).await;

        shutdown.cancel();
        transport.resume_publishing(&topic);
        tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .unwrap();

        assert_eq!(transport.published(&topic).len(), 5);
    }
}
