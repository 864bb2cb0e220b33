use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::ProcessorConfig;
use super::report::{BatchReport, MessageOutcome};
use crate::backoff::BackoffPolicy;
use crate::error::{ConfigError, RepositoryError};
use crate::message::{OutboxMessage, OutboxStatus};
use crate::metrics::{NoopMetrics, OutboxMetrics};
use crate::publisher::{OutboxPublisher, PublishError};
use crate::repository::OutboxRepository;
use crate::resilience::{CircuitBreaker, NoopBreaker};

const TARGET: &str = "sourced_outbox::processor";

/// Why a publish ended without a result.
#[derive(Debug, Clone, Copy)]
enum Interruption {
    Deadline(Duration),
    Shutdown,
}

/// Drains PENDING messages: claim, publish, record the outcome.
///
/// Safe to run from any number of workers against the same repository. A
/// message is only published by the worker whose `mark_processing` call
/// returned the claim; everyone else skips it.
pub struct OutboxProcessor<R, P> {
    repository: R,
    publisher: P,
    config: ProcessorConfig,
    metrics: Arc<dyn OutboxMetrics>,
    breaker: Arc<dyn CircuitBreaker>,
}

impl<R, P> OutboxProcessor<R, P> {
    pub fn new(repository: R, publisher: P, config: ProcessorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            repository,
            publisher,
            config,
            metrics: Arc::new(NoopMetrics),
            breaker: Arc::new(NoopBreaker),
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn OutboxMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Route every publish through `breaker`.
    pub fn with_breaker(mut self, breaker: Arc<dyn CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }
}

impl<R: OutboxRepository, P: OutboxPublisher> OutboxProcessor<R, P> {
    /// Process one batch of PENDING messages.
    ///
    /// Only a failure to fetch the batch is returned as an error. Failures on
    /// individual messages are logged, tallied in the report, and do not stop
    /// the rest of the batch.
    pub async fn process_all(&self) -> Result<BatchReport, RepositoryError> {
        self.process_all_until(&CancellationToken::new()).await
    }

    /// Like [`process_all`](Self::process_all), but stops early once `cancel`
    /// fires: unclaimed messages are left PENDING and in-flight publishes are
    /// abandoned, leaving their messages PROCESSING for the reaper.
    #[tracing::instrument(
        name = "outbox.process_all",
        skip_all,
        fields(batch_size = self.config.batch_size, concurrency = self.config.concurrency)
    )]
    pub async fn process_all_until(
        &self,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, RepositoryError> {
        let started = Instant::now();

        let messages = self
            .repository
            .fetch_batch(OutboxStatus::Pending, self.config.batch_size)
            .await
            .map_err(|err| {
                error!(target: TARGET, error = %err, "failed to fetch pending messages");
                err
            })?;

        if messages.is_empty() {
            debug!(target: TARGET, "no pending messages");
            return Ok(BatchReport::empty());
        }

        let fetched = messages.len();
        let outcomes: Vec<MessageOutcome> = stream::iter(messages)
            .map(|message| self.process_message(message, cancel))
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        let report = BatchReport::from_outcomes(fetched, outcomes, started.elapsed());
        self.metrics
            .record_batch_processing(report.processed(), report.duration);

        info!(
            target: TARGET,
            fetched = report.fetched,
            published = report.published,
            failed = report.failed,
            dead = report.dead,
            skipped = report.skipped,
            abandoned = report.abandoned,
            released = report.released,
            errors = report.errors.len(),
            duration_ms = report.duration.as_millis() as u64,
            "outbox batch processed"
        );
        Ok(report)
    }

    async fn process_message(
        &self,
        message: OutboxMessage,
        cancel: &CancellationToken,
    ) -> MessageOutcome {
        if cancel.is_cancelled() {
            return MessageOutcome::Cancelled;
        }

        let attempt = match self.repository.mark_processing(message.id, Utc::now()).await {
            Ok(Some(attempt)) => attempt,
            Ok(None) => {
                debug!(target: TARGET, message_id = %message.id, "message claimed by another worker");
                return MessageOutcome::Skipped;
            }
            Err(err) => {
                warn!(target: TARGET, message_id = %message.id, error = %err, "failed to claim message");
                return MessageOutcome::RepositoryError(err);
            }
        };

        // Earlier claims used up the budget without recording an outcome.
        let claimed_before = attempt.saturating_sub(1);
        if !BackoffPolicy::should_retry(claimed_before, self.config.max_attempts) {
            return self.on_exhausted(&message, attempt, claimed_before).await;
        }

        let started = Instant::now();

        match self.publish(&message, cancel).await {
            Ok(Ok(())) => self.on_published(&message, started.elapsed()).await,
            Ok(Err(err)) => self.on_failed(&message, attempt, err, started.elapsed()).await,
            Err(interruption) => {
                match interruption {
                    Interruption::Deadline(limit) => warn!(
                        target: TARGET,
                        message_id = %message.id,
                        topic = %message.topic,
                        timeout_ms = limit.as_millis() as u64,
                        "publish deadline exceeded, leaving message for the reaper"
                    ),
                    Interruption::Shutdown => warn!(
                        target: TARGET,
                        message_id = %message.id,
                        topic = %message.topic,
                        "shutdown during publish, leaving message for the reaper"
                    ),
                }
                self.metrics.record_abandoned(&message.topic);
                MessageOutcome::Abandoned
            }
        }
    }

    async fn publish(
        &self,
        message: &OutboxMessage,
        cancel: &CancellationToken,
    ) -> Result<Result<(), PublishError>, Interruption> {
        let action = self
            .publisher
            .publish(&message.topic, &message.payload.bytes, &message.headers);
        let guarded = self.breaker.execute(action);

        let bounded = async {
            match self.config.publish_timeout() {
                Some(limit) => tokio::time::timeout(limit, guarded)
                    .await
                    .map_err(|_| Interruption::Deadline(limit)),
                None => Ok(guarded.await),
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Interruption::Shutdown),
            result = bounded => result,
        }
    }

    async fn on_published(&self, message: &OutboxMessage, latency: Duration) -> MessageOutcome {
        let outcome = match self.repository.mark_published(message.id, Utc::now()).await {
            Ok(true) => {
                debug!(target: TARGET, message_id = %message.id, topic = %message.topic, "message published");
                MessageOutcome::Published
            }
            Ok(false) => {
                // The claim was released underneath us; the sink still has it.
                warn!(
                    target: TARGET,
                    message_id = %message.id,
                    topic = %message.topic,
                    "message published but no longer claimed, it will be delivered again"
                );
                MessageOutcome::Published
            }
            Err(err) => {
                warn!(
                    target: TARGET,
                    message_id = %message.id,
                    error = %err,
                    "message published but not recorded, it will be delivered again"
                );
                MessageOutcome::RepositoryError(err)
            }
        };

        self.metrics.record_published(&message.topic);
        self.metrics.record_latency(&message.topic, latency);
        outcome
    }

    async fn on_failed(
        &self,
        message: &OutboxMessage,
        attempt: u32,
        err: PublishError,
        latency: Duration,
    ) -> MessageOutcome {
        let reason = err.reason();
        let exhausted = !BackoffPolicy::should_retry(attempt, self.config.max_attempts);

        let marked = if exhausted {
            self.repository.mark_dead(message.id, &reason, attempt).await
        } else {
            self.repository.mark_failed(message.id, &reason, attempt).await
        };

        let outcome = match marked {
            Ok(false) => {
                warn!(
                    target: TARGET,
                    message_id = %message.id,
                    topic = %message.topic,
                    attempt,
                    reason = %reason,
                    "message no longer claimed, failure not recorded"
                );
                self.metrics.record_latency(&message.topic, latency);
                return MessageOutcome::Released;
            }
            Err(err) => {
                warn!(
                    target: TARGET,
                    message_id = %message.id,
                    error = %err,
                    "failed to record publish failure"
                );
                MessageOutcome::RepositoryError(err)
            }
            Ok(true) if exhausted => {
                error!(
                    target: TARGET,
                    message_id = %message.id,
                    topic = %message.topic,
                    attempt,
                    reason = %reason,
                    "message dead-lettered"
                );
                MessageOutcome::Dead
            }
            Ok(true) => {
                warn!(
                    target: TARGET,
                    message_id = %message.id,
                    topic = %message.topic,
                    attempt,
                    reason = %reason,
                    "publish failed"
                );
                MessageOutcome::Failed
            }
        };

        if exhausted {
            self.metrics.record_dead(&message.topic);
        } else {
            self.metrics.record_failed(&message.topic, &reason);
        }
        self.metrics.record_latency(&message.topic, latency);
        outcome
    }

    /// Dead-letter a message whose earlier claims all ended without an
    /// outcome (deadline or shutdown), without publishing it again.
    async fn on_exhausted(
        &self,
        message: &OutboxMessage,
        attempt: u32,
        claimed_before: u32,
    ) -> MessageOutcome {
        let reason = format!("Exhausted: {claimed_before} claims without a recorded outcome");

        match self.repository.mark_dead(message.id, &reason, attempt).await {
            Ok(true) => {
                error!(
                    target: TARGET,
                    message_id = %message.id,
                    topic = %message.topic,
                    attempt,
                    reason = %reason,
                    "message dead-lettered"
                );
                self.metrics.record_dead(&message.topic);
                MessageOutcome::Dead
            }
            Ok(false) => {
                warn!(target: TARGET, message_id = %message.id, "message no longer claimed, dead-letter not recorded");
                MessageOutcome::Released
            }
            Err(err) => {
                warn!(
                    target: TARGET,
                    message_id = %message.id,
                    error = %err,
                    "failed to dead-letter exhausted message"
                );
                MessageOutcome::RepositoryError(err)
            }
        }
    }
}
