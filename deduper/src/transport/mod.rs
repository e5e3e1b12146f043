//! Publish/subscribe capabilities the relay is driven by.
//!
//! The relay only needs to read a stream of messages per topic and to publish
//! bytes to a topic. [`nats::NatsTransport`] backs both with a NATS connection,
//! [`memory::MemoryTransport`] keeps everything in process for tests.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::DedupError;

pub mod memory;
pub mod nats;

pub use memory::MemoryTransport;
pub use nats::NatsTransport;

/// A message delivered by a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestMessage {
    pub subject: String,
    pub payload: Bytes,
}

impl IngestMessage {
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
        }
    }
}

pub type MessageStream = BoxStream<'static, IngestMessage>;

#[async_trait]
pub trait MessageSource {
    /// Start receiving messages published on `topic`. The stream ends when the
    /// subscription is closed by the transport.
    async fn subscribe(&self, topic: &str) -> Result<MessageStream, DedupError>;
}

#[async_trait]
pub trait Publisher {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), DedupError>;

    /// Wait until everything published so far has been handed to the server.
    async fn flush(&self) -> Result<(), DedupError> {
        Ok(())
    }
}
