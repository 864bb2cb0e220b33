//! Wraps the in-memory store and injects storage errors on demand.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sourced_outbox::{
    InMemoryOutboxRepository, OutboxMessage, OutboxRepository, OutboxStatus, RepositoryError,
};
use uuid::Uuid;

/// Delegates to an [`InMemoryOutboxRepository`] except where a failure has
/// been armed with [`FlakyRepository::fail`]. Failures are keyed by the
/// operation name (`"mark_published"`, `"fetch_batch"`, ...).
#[derive(Clone, Default)]
pub struct FlakyRepository {
    inner: InMemoryOutboxRepository,
    armed: Arc<Mutex<HashMap<&'static str, usize>>>,
    finish_after_scan: Arc<Mutex<Vec<Uuid>>>,
    race_after_fetch: Arc<Mutex<Vec<Uuid>>>,
    release_before_record: Arc<Mutex<Vec<Uuid>>>,
}

impl FlakyRepository {
    pub fn new(inner: InMemoryOutboxRepository) -> Self {
        Self {
            inner,
            armed: Arc::default(),
            finish_after_scan: Arc::default(),
            race_after_fetch: Arc::default(),
            release_before_record: Arc::default(),
        }
    }

    pub fn inner(&self) -> &InMemoryOutboxRepository {
        &self.inner
    }

    /// Fail the next `times` calls to `operation`.
    pub fn fail(&self, operation: &'static str, times: usize) {
        *self.armed.lock().unwrap().entry(operation).or_default() += times;
    }

    /// Publish `id` right after the next `fetch_stuck` scan, as a slow
    /// worker finishing between the reaper's scan and its release would.
    pub fn finish_after_scan(&self, id: Uuid) {
        self.finish_after_scan.lock().unwrap().push(id);
    }

    /// Between the next `fetch_batch` and the caller's claim, another worker
    /// claims `id`, fails its publish and the retry scheduler requeues it.
    pub fn race_after_fetch(&self, id: Uuid) {
        self.race_after_fetch.lock().unwrap().push(id);
    }

    /// Release the claim on `id` just before the worker records a failure,
    /// as a reaper sweeping a slow publish would.
    pub fn release_before_record(&self, id: Uuid) {
        self.release_before_record.lock().unwrap().push(id);
    }

    async fn release_if_armed(&self, id: Uuid) -> Result<(), RepositoryError> {
        let armed = {
            let mut pending = self.release_before_record.lock().unwrap();
            let before = pending.len();
            pending.retain(|armed| *armed != id);
            pending.len() != before
        };
        if armed {
            let cutoff = Utc::now() + chrono::Duration::days(1);
            self.inner.release_stuck(id, cutoff).await?;
        }
        Ok(())
    }

    fn check(&self, operation: &'static str) -> Result<(), RepositoryError> {
        let mut armed = self.armed.lock().unwrap();
        match armed.get_mut(operation) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(RepositoryError::storage(format!("{operation}: connection reset")))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl OutboxRepository for FlakyRepository {
    async fn fetch_batch(
        &self,
        status: OutboxStatus,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>, RepositoryError> {
        self.check("fetch_batch")?;
        let batch = self.inner.fetch_batch(status, limit).await?;
        let racing: Vec<Uuid> = self.race_after_fetch.lock().unwrap().drain(..).collect();
        for id in racing {
            if let Some(attempts) = self.inner.mark_processing(id, Utc::now()).await? {
                let reason = "ConnectionFailed: other worker";
                self.inner.mark_failed(id, reason, attempts).await?;
                self.inner.mark_retryable(id, reason, attempts).await?;
            }
        }
        Ok(batch)
    }

    async fn mark_processing(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<u32>, RepositoryError> {
        self.check("mark_processing")?;
        self.inner.mark_processing(id, now).await
    }

    async fn mark_published(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        self.check("mark_published")?;
        self.inner.mark_published(id, now).await
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        reason: &str,
        attempts: u32,
    ) -> Result<bool, RepositoryError> {
        self.check("mark_failed")?;
        self.release_if_armed(id).await?;
        self.inner.mark_failed(id, reason, attempts).await
    }

    async fn mark_dead(
        &self,
        id: Uuid,
        reason: &str,
        attempts: u32,
    ) -> Result<bool, RepositoryError> {
        self.check("mark_dead")?;
        self.release_if_armed(id).await?;
        self.inner.mark_dead(id, reason, attempts).await
    }

    async fn mark_retryable(
        &self,
        id: Uuid,
        reason: &str,
        attempts: u32,
    ) -> Result<bool, RepositoryError> {
        self.check("mark_retryable")?;
        self.inner.mark_retryable(id, reason, attempts).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OutboxMessage>, RepositoryError> {
        self.check("find_by_id")?;
        self.inner.find_by_id(id).await
    }

    async fn count_by_status(&self, status: OutboxStatus) -> Result<u64, RepositoryError> {
        self.check("count_by_status")?;
        self.inner.count_by_status(status).await
    }

    async fn delete_published_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        self.check("delete_published_older_than")?;
        self.inner.delete_published_older_than(cutoff).await
    }

    async fn fetch_stuck(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>, RepositoryError> {
        self.check("fetch_stuck")?;
        let stuck = self.inner.fetch_stuck(cutoff, limit).await?;
        let finishing: Vec<Uuid> = self.finish_after_scan.lock().unwrap().drain(..).collect();
        for id in finishing {
            self.inner.mark_published(id, Utc::now()).await?;
        }
        Ok(stuck)
    }

    async fn release_stuck(
        &self,
        id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        self.check("release_stuck")?;
        self.inner.release_stuck(id, cutoff).await
    }
}
