use std::sync::Arc;

use async_trait::async_trait;

use super::PublishError;
use crate::message::Headers;

/// Trait for publishing outbox messages to an external sink.
///
/// May block on network I/O for as long as it likes; the processor bounds
/// each call with its own deadline. Any `Err` counts as a failed attempt.
#[async_trait]
pub trait OutboxPublisher: Send + Sync {
    async fn publish(&self, topic: &str, body: &[u8], headers: &Headers)
        -> Result<(), PublishError>;
}

#[async_trait]
impl<P: OutboxPublisher + ?Sized> OutboxPublisher for Arc<P> {
    async fn publish(
        &self,
        topic: &str,
        body: &[u8],
        headers: &Headers,
    ) -> Result<(), PublishError> {
        (**self).publish(topic, body, headers).await
    }
}

#[async_trait]
impl<P: OutboxPublisher + ?Sized> OutboxPublisher for Box<P> {
    async fn publish(
        &self,
        topic: &str,
        body: &[u8],
        headers: &Headers,
    ) -> Result<(), PublishError> {
        (**self).publish(topic, body, headers).await
    }
}
