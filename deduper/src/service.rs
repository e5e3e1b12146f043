use std::future::Future;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use common_redis::{Client, RedisClient};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cache::SeenCache;
use crate::category::Category;
use crate::config::Config;
use crate::engine::DedupEngine;
use crate::normalizer;
use crate::router::IngestionRouter;
use crate::transport::{MessageSource, NatsTransport, Publisher};

fn validate(config: &Config) -> Result<()> {
    config
        .validate()
        .map_err(|e| anyhow!(e))
        .context("Configuration validation failed")
}

/// The deduplication relay: one engine per category behind an ingestion router.
pub struct DeduperService {
    config: Config,
    cache: Arc<dyn Client + Send + Sync>,
    source: Arc<dyn MessageSource + Send + Sync>,
    publisher: Arc<dyn Publisher + Send + Sync>,
}

impl DeduperService {
    /// Build the service on top of already established capabilities.
    pub fn new(
        config: Config,
        cache: Arc<dyn Client + Send + Sync>,
        source: Arc<dyn MessageSource + Send + Sync>,
        publisher: Arc<dyn Publisher + Send + Sync>,
    ) -> Result<Self> {
        validate(&config)?;

        Ok(Self {
            config,
            cache,
            source,
            publisher,
        })
    }

    /// Connect to NATS and Redis. Either failing is fatal for the process.
    pub async fn connect(config: Config) -> Result<Self> {
        validate(&config)?;
        let redis_info = config
            .redis_connection_info()
            .with_context(|| format!("Invalid Redis address {}", config.redis_addr))?;

        let transport = Arc::new(
            NatsTransport::connect(&config.nats_url)
                .await
                .with_context(|| format!("Unable to connect to NATS at {}", config.nats_url))?,
        );

        info!("Connecting to Redis at {}", config.redis_addr);
        let redis = RedisClient::with_config(
            redis_info,
            config.redis_response_timeout(),
            config.redis_connection_timeout(),
        )
        .await
        .with_context(|| format!("Unable to connect to Redis at {}", config.redis_addr))?;

        Self::new(config, Arc::new(redis), transport.clone(), transport)
    }

    fn build_router(&self) -> IngestionRouter {
        let cache = SeenCache::new(self.cache.clone(), self.config.cache_ttl());

        Category::ALL
            .into_iter()
            .fold(
                IngestionRouter::new(self.config.intake_capacity),
                |router, category| {
                    let topics = self.config.topics(category);
                    let engine = DedupEngine::new(
                        category,
                        topics.deduped,
                        normalizer::for_category(category, self.config.price_scale()),
                        cache.clone(),
                        self.publisher.clone(),
                    );
                    router.route(topics.ingest, Arc::new(engine))
                },
            )
    }

    /// Run until ctrl-c.
    pub async fn run(self) -> Result<()> {
        self.run_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {e:#}");
            }
        })
        .await
    }

    /// Run until `shutdown_signal` resolves, then drain queued messages.
    pub async fn run_with_shutdown(self, shutdown_signal: impl Future<Output = ()>) -> Result<()> {
        let shutdown = CancellationToken::new();
        let handle = self
            .build_router()
            .start(self.source.clone(), shutdown.clone())
            .await
            .context("No category could be subscribed")?;

        info!(
            categories = ?handle.active_categories(),
            cache_time = self.config.cache_time,
            "Deduper listening"
        );

        shutdown_signal.await;
        info!("Received shutdown signal, draining intake queues...");
        shutdown.cancel();

        match tokio::time::timeout(self.config.shutdown_timeout(), handle.join()).await {
            Ok(()) => info!("Deduper stopped"),
            Err(_) => error!(
                "Deduper shutdown timed out after {:?}",
                self.config.shutdown_timeout()
            ),
        }
        if let Err(e) = self.publisher.flush().await {
            error!(error = ?e, "Failed to flush published messages");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_validates_before_dialing() {
        let mut config = Config::default_for_test();
        config.cache_time = 0;
        // Nothing listens here, so any dial attempt would surface as a connection error
        config.nats_url = "nats://127.0.0.1:1".to_string();
        config.redis_addr = "127.0.0.1:1".to_string();

        let err = match DeduperService::connect(config).await {
            Ok(_) => panic!("invalid configuration was accepted"),
            Err(e) => e,
        };
        assert_eq!(err.to_string(), "Configuration validation failed");
    }
}
