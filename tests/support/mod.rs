//! Shared doubles for the integration tests.

#![allow(dead_code)]

pub mod flaky_repository;
pub mod scripted_publisher;

use sourced_outbox::{OutboxMessage, Payload};

pub use flaky_repository::FlakyRepository;
pub use scripted_publisher::{ScriptedPublisher, Step};

/// A PENDING `OrderPlaced` message on `topic`.
pub fn order_placed(order_id: &str, topic: &str) -> OutboxMessage {
    let body = format!(r#"{{"order_id":"{order_id}"}}"#);
    OutboxMessage::new("Order", order_id, "OrderPlaced", topic, Payload::text(body))
        .with_header("correlation_id", format!("req-{order_id}"))
}
