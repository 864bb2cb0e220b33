use std::sync::Mutex;

use async_trait::async_trait;
use event_emitter_rs::EventEmitter;
use serde::{Deserialize, Serialize};

use super::{OutboxPublisher, PublishError};
use crate::message::Headers;

/// What in-process listeners receive for each published message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmittedMessage {
    pub topic: String,
    pub body: Vec<u8>,
    pub headers: Headers,
}

/// A publisher that fans messages out to in-process listeners, keyed by
/// topic. Listeners run on the emitter's own threads.
/// Requires the `emitter` feature.
pub struct LocalEmitterPublisher {
    emitter: Mutex<EventEmitter>,
}

impl Default for LocalEmitterPublisher {
    fn default() -> Self {
        Self::new(EventEmitter::new())
    }
}

impl LocalEmitterPublisher {
    pub fn new(emitter: EventEmitter) -> Self {
        LocalEmitterPublisher {
            emitter: Mutex::new(emitter),
        }
    }

    /// Register a listener for a topic. Returns the listener id.
    pub fn on<F>(&self, topic: &str, listener: F) -> Result<String, PublishError>
    where
        F: Fn(EmittedMessage) + Send + Sync + 'static,
    {
        let mut emitter = self
            .emitter
            .lock()
            .map_err(|_| PublishError::Rejected("event emitter poisoned".into()))?;
        Ok(emitter.on(topic, listener))
    }
}

#[async_trait]
impl OutboxPublisher for LocalEmitterPublisher {
    async fn publish(
        &self,
        topic: &str,
        body: &[u8],
        headers: &Headers,
    ) -> Result<(), PublishError> {
        let message = EmittedMessage {
            topic: topic.to_string(),
            body: body.to_vec(),
            headers: headers.clone(),
        };
        let mut emitter = self
            .emitter
            .lock()
            .map_err(|_| PublishError::Rejected("event emitter poisoned".into()))?;
        // Listener threads are detached; delivery to them is fire-and-forget.
        let _ = emitter.emit(topic, message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn listeners_receive_messages_for_their_topic() {
        let publisher = LocalEmitterPublisher::default();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        publisher
            .on("orders", move |message: EmittedMessage| {
                if let Ok(tx) = tx.lock() {
                    let _ = tx.send(message);
                }
            })
            .unwrap();

        let mut headers = Headers::new();
        headers.insert("tenant".into(), "acme".into());
        publisher.publish("orders", b"{\"id\":1}", &headers).await.unwrap();
        publisher.publish("payments", b"{}", &Headers::new()).await.unwrap();

        let received = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(received.topic, "orders");
        assert_eq!(received.body, b"{\"id\":1}");
        assert_eq!(received.headers.get("tenant").map(String::as_str), Some("acme"));
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }
}
