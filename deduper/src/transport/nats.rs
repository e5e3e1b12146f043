use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tracing::info;

use crate::error::DedupError;
use crate::transport::{IngestMessage, MessageSource, MessageStream, Publisher};

/// NATS core pub/sub; messages are pushed as they arrive, no JetStream.
#[derive(Clone)]
pub struct NatsTransport {
    client: async_nats::Client,
}

impl NatsTransport {
    pub async fn connect(url: &str) -> Result<Self, async_nats::ConnectError> {
        info!("Connecting to NATS at {}", url);
        let client = async_nats::connect(url).await?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MessageSource for NatsTransport {
    async fn subscribe(&self, topic: &str) -> Result<MessageStream, DedupError> {
        info!("Subscribing to subject: {}", topic);
        let subscriber = self
            .client
            .subscribe(topic.to_string())
            .await
            .map_err(|e| DedupError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        Ok(subscriber
            .map(|msg| IngestMessage {
                subject: msg.subject.to_string(),
                payload: msg.payload,
            })
            .boxed())
    }
}

#[async_trait]
impl Publisher for NatsTransport {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), DedupError> {
        self.client
            .publish(topic.to_string(), payload)
            .await
            .map_err(|e| DedupError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn flush(&self) -> Result<(), DedupError> {
        self.client.flush().await.map_err(|e| DedupError::Publish {
            topic: "*".to_string(),
            reason: e.to_string(),
        })
    }
}
