//! Transactional outbox engine.
//!
//! Domain code appends [`OutboxMessage`]s in the same transaction as its state
//! change. The [`OutboxProcessor`] later claims them, hands them to an
//! [`OutboxPublisher`], and records the outcome. Failed messages come back
//! through the [`RetryScheduler`] until they run out of attempts and are
//! dead-lettered; claims stranded by a crashed worker are released by the
//! [`Reaper`]. Delivery is at-least-once, so consumers must dedupe on the
//! message id.

mod backoff;
mod config;
mod error;
mod message;
mod processor;
mod reaper;
mod retry;

pub mod metrics;
pub mod publisher;
pub mod repository;
pub mod resilience;

pub use backoff::BackoffPolicy;
pub use config::OutboxConfig;
pub use error::{ConfigError, RepositoryError};
pub use message::{Headers, OutboxMessage, OutboxStatus, ParseStatusError, Payload};
pub use processor::{BatchReport, MessageOutcome, OutboxProcessor, ProcessorConfig};
pub use reaper::{Reaper, ReaperConfig, ReaperReport};
pub use retry::{RetryConfig, RetryReport, RetryScheduler};

pub use metrics::{InMemoryMetrics, NoopMetrics, OutboxMetrics, TracingMetrics};
pub use publisher::{LogPublisher, OutboxPublisher, PublishError};
pub use repository::{InMemoryOutboxRepository, OutboxRepository};
pub use resilience::{CircuitBreaker, ConsecutiveFailureBreaker, NoopBreaker};

#[cfg(feature = "emitter")]
pub use publisher::{EmittedMessage, LocalEmitterPublisher};

// Re-exported so callers can share an emitter with `LocalEmitterPublisher`.
#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;

/// Re-exported for `process_all_until`.
pub use tokio_util::sync::CancellationToken;
