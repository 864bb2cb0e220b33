use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{OutboxStatus, Payload};

/// Headers carried through to the sink, iterated in key order.
pub type Headers = BTreeMap<String, String>;

/// The unit of reliable delivery.
///
/// Everything except `status`, `attempts`, `processing_at`, `published_at`
/// and `last_error` is fixed when the caller appends the message. Those five
/// fields belong to the engine and are only changed through an
/// [`OutboxRepository`](crate::OutboxRepository).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub topic: String,
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: Headers,
    pub occurred_at: DateTime<Utc>,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub processing_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl OutboxMessage {
    /// Create a PENDING message with a fresh id, ready to be appended.
    pub fn new(
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        event_type: impl Into<String>,
        topic: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
            event_type: event_type.into(),
            topic: topic.into(),
            payload,
            headers: Headers::new(),
            occurred_at: Utc::now(),
            status: OutboxStatus::Pending,
            attempts: 0,
            processing_at: None,
            published_at: None,
            last_error: None,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.header("correlation_id")
    }

    pub fn is_pending(&self) -> bool {
        self.status == OutboxStatus::Pending
    }

    pub fn is_processing(&self) -> bool {
        self.status == OutboxStatus::Processing
    }

    pub fn is_published(&self) -> bool {
        self.status == OutboxStatus::Published
    }

    pub fn is_failed(&self) -> bool {
        self.status == OutboxStatus::Failed
    }

    pub fn is_dead(&self) -> bool {
        self.status == OutboxStatus::Dead
    }

    /// When the last delivery attempt started, falling back to creation time.
    pub fn last_attempt_at(&self) -> DateTime<Utc> {
        self.processing_at.unwrap_or(self.occurred_at)
    }
}
