use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{OutboxPublisher, PublishError};
use crate::message::Headers;

/// A publisher that logs each message through `tracing`, or appends the
/// formatted line to a shared buffer when one is given.
#[derive(Clone, Default)]
pub struct LogPublisher {
    buffer: Option<Arc<Mutex<Vec<String>>>>,
}

impl LogPublisher {
    pub fn new() -> Self {
        LogPublisher { buffer: None }
    }

    pub fn with_buffer(buffer: Arc<Mutex<Vec<String>>>) -> Self {
        LogPublisher {
            buffer: Some(buffer),
        }
    }

    fn format_line(topic: &str, body: &[u8], headers: &Headers) -> String {
        let body = String::from_utf8_lossy(body);
        if headers.is_empty() {
            format!("[OUTBOX] {} {}", topic, body)
        } else {
            format!("[OUTBOX] {} {} headers={:?}", topic, body, headers)
        }
    }
}

#[async_trait]
impl OutboxPublisher for LogPublisher {
    async fn publish(
        &self,
        topic: &str,
        body: &[u8],
        headers: &Headers,
    ) -> Result<(), PublishError> {
        let line = Self::format_line(topic, body, headers);
        match &self.buffer {
            Some(buffer) => {
                let mut buffer = buffer
                    .lock()
                    .map_err(|_| PublishError::Rejected("log publisher buffer poisoned".into()))?;
                buffer.push(line);
            }
            None => tracing::info!(target: "sourced_outbox::publisher", "{}", line),
        }
        Ok(())
    }
}
