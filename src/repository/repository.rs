use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::message::{OutboxMessage, OutboxStatus};

/// Storage and arbitration for outbox messages.
///
/// Every `mark_*` operation is a conditional update: it only applies when the
/// message is in the expected source state, and reports `Ok(false)` (`Ok(None)`
/// for the claim) without mutating anything otherwise. Terminal messages (PUBLISHED, DEAD) therefore
/// never change again. Implementations must perform the check and the write
/// as one atomic step (conditional `UPDATE ... WHERE status = ...`, row lock,
/// compare-and-swap) rather than read-then-write.
///
/// Attempt counts passed to the failure transitions are recorded as
/// `max(stored, supplied)`, so `attempts` never decreases.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Up to `limit` messages in `status`, oldest `occurred_at` first.
    /// Read-only; returns an empty list when nothing matches.
    async fn fetch_batch(
        &self,
        status: OutboxStatus,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>, RepositoryError>;

    /// Claim a message: PENDING -> PROCESSING, `attempts += 1`,
    /// `processing_at = now`. Returns the stored attempt count after the
    /// increment, or `None` when the message is no longer PENDING (another
    /// worker won) or does not exist.
    async fn mark_processing(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<u32>, RepositoryError>;

    /// PROCESSING -> PUBLISHED. A second call on a published message is a
    /// no-op returning `false`.
    async fn mark_published(&self, id: Uuid, now: DateTime<Utc>)
        -> Result<bool, RepositoryError>;

    /// PROCESSING -> FAILED, recording the reason and attempt count.
    async fn mark_failed(
        &self,
        id: Uuid,
        reason: &str,
        attempts: u32,
    ) -> Result<bool, RepositoryError>;

    /// PROCESSING -> DEAD, recording the reason and attempt count.
    async fn mark_dead(
        &self,
        id: Uuid,
        reason: &str,
        attempts: u32,
    ) -> Result<bool, RepositoryError>;

    /// FAILED -> PENDING once backoff has elapsed.
    async fn mark_retryable(
        &self,
        id: Uuid,
        reason: &str,
        attempts: u32,
    ) -> Result<bool, RepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OutboxMessage>, RepositoryError>;

    async fn count_by_status(&self, status: OutboxStatus) -> Result<u64, RepositoryError>;

    /// Remove PUBLISHED messages whose `published_at` is before `cutoff`.
    /// Returns how many were removed.
    async fn delete_published_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;

    /// Up to `limit` PROCESSING messages claimed at or before `cutoff`,
    /// oldest claim first.
    async fn fetch_stuck(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>, RepositoryError>;

    /// Revert a stuck claim: PROCESSING -> PENDING, guarded by the message
    /// still being PROCESSING with `processing_at <= cutoff`. `attempts` is
    /// left as is.
    async fn release_stuck(&self, id: Uuid, cutoff: DateTime<Utc>)
        -> Result<bool, RepositoryError>;
}

#[async_trait]
impl<R: OutboxRepository + ?Sized> OutboxRepository for std::sync::Arc<R> {
    async fn fetch_batch(
        &self,
        status: OutboxStatus,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>, RepositoryError> {
        (**self).fetch_batch(status, limit).await
    }

    async fn mark_processing(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<u32>, RepositoryError> {
        (**self).mark_processing(id, now).await
    }

    async fn mark_published(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        (**self).mark_published(id, now).await
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        reason: &str,
        attempts: u32,
    ) -> Result<bool, RepositoryError> {
        (**self).mark_failed(id, reason, attempts).await
    }

    async fn mark_dead(
        &self,
        id: Uuid,
        reason: &str,
        attempts: u32,
    ) -> Result<bool, RepositoryError> {
        (**self).mark_dead(id, reason, attempts).await
    }

    async fn mark_retryable(
        &self,
        id: Uuid,
        reason: &str,
        attempts: u32,
    ) -> Result<bool, RepositoryError> {
        (**self).mark_retryable(id, reason, attempts).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OutboxMessage>, RepositoryError> {
        (**self).find_by_id(id).await
    }

    async fn count_by_status(&self, status: OutboxStatus) -> Result<u64, RepositoryError> {
        (**self).count_by_status(status).await
    }

    async fn delete_published_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        (**self).delete_published_older_than(cutoff).await
    }

    async fn fetch_stuck(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>, RepositoryError> {
        (**self).fetch_stuck(cutoff, limit).await
    }

    async fn release_stuck(
        &self,
        id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        (**self).release_stuck(id, cutoff).await
    }
}
