//! Moves FAILED messages back to PENDING once their backoff has elapsed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::error::{ConfigError, RepositoryError};
use crate::message::OutboxStatus;
use crate::repository::OutboxRepository;

const TARGET: &str = "sourced_outbox::retry";

const DEFAULT_BATCH_SIZE: usize = 100;

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl RetryConfig {
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("retry.batch_size", "must be greater than zero"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryReport {
    /// FAILED messages examined.
    pub scanned: usize,
    /// Messages returned to PENDING.
    pub requeued: usize,
    /// Messages still inside their backoff window, or changed concurrently.
    pub waiting: usize,
    pub errors: Vec<RepositoryError>,
    pub duration: Duration,
}

/// Applies [`BackoffPolicy`] to FAILED messages.
///
/// A message that failed on its `n`th attempt becomes eligible again at
/// `last_attempt_at + base * 2^n`, capped at the ceiling.
pub struct RetryScheduler<R> {
    repository: R,
    backoff: BackoffPolicy,
    config: RetryConfig,
}

impl<R> RetryScheduler<R> {
    pub fn new(repository: R, backoff: BackoffPolicy, config: RetryConfig) -> Result<Self, ConfigError> {
        backoff.validate()?;
        config.validate()?;
        Ok(Self {
            repository,
            backoff,
            config,
        })
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }
}

impl<R: OutboxRepository> RetryScheduler<R> {
    pub async fn run(&self) -> Result<RetryReport, RepositoryError> {
        self.run_at(Utc::now()).await
    }

    #[tracing::instrument(name = "outbox.retry_run", skip_all, fields(now = %now))]
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<RetryReport, RepositoryError> {
        let started = Instant::now();
        let failed = self
            .repository
            .fetch_batch(OutboxStatus::Failed, self.config.batch_size)
            .await
            .map_err(|err| {
                warn!(target: TARGET, error = %err, "failed to fetch failed messages");
                err
            })?;

        let mut report = RetryReport {
            scanned: failed.len(),
            ..Default::default()
        };

        for message in failed {
            let eligible_at = self
                .backoff
                .next_eligible_at(message.last_attempt_at(), message.attempts);
            if eligible_at > now {
                report.waiting += 1;
                continue;
            }

            let reason = message.last_error.as_deref().unwrap_or_default();
            match self
                .repository
                .mark_retryable(message.id, reason, message.attempts)
                .await
            {
                Ok(true) => {
                    debug!(
                        target: TARGET,
                        message_id = %message.id,
                        topic = %message.topic,
                        attempt = message.attempts,
                        "message requeued"
                    );
                    report.requeued += 1;
                }
                Ok(false) => report.waiting += 1,
                Err(err) => {
                    warn!(
                        target: TARGET,
                        message_id = %message.id,
                        error = %err,
                        "failed to requeue message"
                    );
                    report.errors.push(err);
                }
            }
        }

        report.duration = started.elapsed();
        if report.requeued > 0 || !report.errors.is_empty() {
            info!(
                target: TARGET,
                scanned = report.scanned,
                requeued = report.requeued,
                waiting = report.waiting,
                errors = report.errors.len(),
                "retry run finished"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{OutboxMessage, Payload};
    use crate::repository::InMemoryOutboxRepository;

    fn base() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    /// Append, claim at `base()`, and fail with `attempts` recorded.
    async fn failed(repo: &InMemoryOutboxRepository, attempts: u32) -> OutboxMessage {
        let message = OutboxMessage::new("Order", "o-1", "OrderPlaced", "orders", Payload::text("{}"))
            .with_occurred_at(base());
        repo.append(message.clone()).unwrap();
        repo.mark_processing(message.id, base()).await.unwrap();
        repo.mark_failed(message.id, "Timeout: publish timed out", attempts)
            .await
            .unwrap();
        message
    }

    fn scheduler(repo: &InMemoryOutboxRepository) -> RetryScheduler<InMemoryOutboxRepository> {
        let backoff = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(60));
        RetryScheduler::new(repo.clone(), backoff, RetryConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn waits_for_backoff_then_requeues() {
        let repo = InMemoryOutboxRepository::new();
        let message = failed(&repo, 2).await;
        let scheduler = scheduler(&repo);

        let early = scheduler
            .run_at(base() + chrono::Duration::seconds(3))
            .await
            .unwrap();
        assert_eq!(early.scanned, 1);
        assert_eq!(early.waiting, 1);
        assert_eq!(early.requeued, 0);

        let due = scheduler
            .run_at(base() + chrono::Duration::seconds(4))
            .await
            .unwrap();
        assert_eq!(due.requeued, 1);

        let stored = repo.find_by_id(message.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OutboxStatus::Pending);
        assert_eq!(stored.attempts, 2);
        assert_eq!(stored.last_error.as_deref(), Some("Timeout: publish timed out"));
    }

    #[tokio::test]
    async fn ceiling_bounds_the_wait() {
        let repo = InMemoryOutboxRepository::new();
        failed(&repo, 30).await;

        let report = scheduler(&repo)
            .run_at(base() + chrono::Duration::seconds(60))
            .await
            .unwrap();
        assert_eq!(report.requeued, 1);
    }

    #[tokio::test]
    async fn nothing_to_do() {
        let report = scheduler(&InMemoryOutboxRepository::new())
            .run_at(base())
            .await
            .unwrap();
        assert_eq!(report.scanned, 0);
        assert_eq!(report.requeued, 0);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn rejects_invalid_backoff() {
        let backoff = BackoffPolicy::new(Duration::ZERO, Duration::from_secs(1));
        assert!(
            RetryScheduler::new(InMemoryOutboxRepository::new(), backoff, RetryConfig::default())
                .is_err()
        );
    }
}
