use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::OutboxMetrics;

/// Per-topic tallies.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TopicCounters {
    pub published: u64,
    pub failed: u64,
    pub dead: u64,
    pub abandoned: u64,
    pub failure_reasons: Vec<String>,
    pub latencies: Vec<Duration>,
}

/// Point-in-time copy of everything an [`InMemoryMetrics`] has recorded.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub topics: BTreeMap<String, TopicCounters>,
    /// `(processed, duration)` per non-empty batch, in order.
    pub batches: Vec<(usize, Duration)>,
}

impl MetricsSnapshot {
    pub fn topic(&self, topic: &str) -> TopicCounters {
        self.topics.get(topic).cloned().unwrap_or_default()
    }

    pub fn total_published(&self) -> u64 {
        self.topics.values().map(|t| t.published).sum()
    }

    pub fn total_dead(&self) -> u64 {
        self.topics.values().map(|t| t.dead).sum()
    }
}

/// Metrics sink that keeps everything in memory. Handy in tests and for
/// exposing counters from a process that has no metrics backend.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    state: Mutex<MetricsSnapshot>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.lock().clone()
    }

    pub fn published(&self, topic: &str) -> u64 {
        self.lock().topics.get(topic).map_or(0, |t| t.published)
    }

    pub fn failed(&self, topic: &str) -> u64 {
        self.lock().topics.get(topic).map_or(0, |t| t.failed)
    }

    pub fn dead(&self, topic: &str) -> u64 {
        self.lock().topics.get(topic).map_or(0, |t| t.dead)
    }

    pub fn batches(&self) -> Vec<(usize, Duration)> {
        self.lock().batches.clone()
    }

    // Recording must never fail, so a poisoned lock is simply reused.
    fn lock(&self) -> MutexGuard<'_, MetricsSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_topic(&self, topic: &str, update: impl FnOnce(&mut TopicCounters)) {
        let mut state = self.lock();
        update(state.topics.entry(topic.to_string()).or_default());
    }
}

impl OutboxMetrics for InMemoryMetrics {
    fn record_published(&self, topic: &str) {
        self.with_topic(topic, |t| t.published += 1);
    }

    fn record_failed(&self, topic: &str, reason: &str) {
        self.with_topic(topic, |t| {
            t.failed += 1;
            t.failure_reasons.push(reason.to_string());
        });
    }

    fn record_dead(&self, topic: &str) {
        self.with_topic(topic, |t| t.dead += 1);
    }

    fn record_latency(&self, topic: &str, duration: Duration) {
        self.with_topic(topic, |t| t.latencies.push(duration));
    }

    fn record_batch_processing(&self, processed: usize, duration: Duration) {
        self.lock().batches.push((processed, duration));
    }

    fn record_abandoned(&self, topic: &str) {
        self.with_topic(topic, |t| t.abandoned += 1);
    }
}
