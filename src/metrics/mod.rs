//! Observability hooks invoked around each delivery outcome.

mod in_memory;
mod metrics;

pub use in_memory::{InMemoryMetrics, MetricsSnapshot, TopicCounters};
pub use metrics::{NoopMetrics, OutboxMetrics, TracingMetrics};
