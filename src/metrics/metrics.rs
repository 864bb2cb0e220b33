use std::time::Duration;

/// Metrics sink. Every method is fire-and-forget: implementations must not
/// panic and have no way to report failure back to the processor.
pub trait OutboxMetrics: Send + Sync {
    fn record_published(&self, topic: &str);

    fn record_failed(&self, topic: &str, reason: &str);

    fn record_dead(&self, topic: &str);

    fn record_latency(&self, topic: &str, duration: Duration);

    fn record_batch_processing(&self, processed: usize, duration: Duration);

    /// A publish was cut off by its deadline or by shutdown; the message
    /// stays claimed until the reaper releases it.
    fn record_abandoned(&self, _topic: &str) {}
}

/// Discards everything; the default sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl OutboxMetrics for NoopMetrics {
    fn record_published(&self, _topic: &str) {}

    fn record_failed(&self, _topic: &str, _reason: &str) {}

    fn record_dead(&self, _topic: &str) {}

    fn record_latency(&self, _topic: &str, _duration: Duration) {}

    fn record_batch_processing(&self, _processed: usize, _duration: Duration) {}
}

/// Reports every measurement as a `tracing` event under
/// `sourced_outbox::metrics`, for deployments that scrape logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl OutboxMetrics for TracingMetrics {
    fn record_published(&self, topic: &str) {
        tracing::debug!(target: "sourced_outbox::metrics", topic, "outbox.published");
    }

    fn record_failed(&self, topic: &str, reason: &str) {
        tracing::debug!(target: "sourced_outbox::metrics", topic, reason, "outbox.failed");
    }

    fn record_dead(&self, topic: &str) {
        tracing::debug!(target: "sourced_outbox::metrics", topic, "outbox.dead");
    }

    fn record_latency(&self, topic: &str, duration: Duration) {
        tracing::debug!(
            target: "sourced_outbox::metrics",
            topic,
            duration_ms = duration.as_millis() as u64,
            "outbox.publish_latency"
        );
    }

    fn record_batch_processing(&self, processed: usize, duration: Duration) {
        tracing::debug!(
            target: "sourced_outbox::metrics",
            processed,
            duration_ms = duration.as_millis() as u64,
            "outbox.batch"
        );
    }

    fn record_abandoned(&self, topic: &str) {
        tracing::debug!(target: "sourced_outbox::metrics", topic, "outbox.abandoned");
    }
}
