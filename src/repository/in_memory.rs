use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{OutboxRepository, RECLAIMED_REASON};
use crate::error::RepositoryError;
use crate::message::{OutboxMessage, OutboxStatus};

type Store = HashMap<Uuid, OutboxMessage>;

/// In-memory outbox store.
///
/// Cloning yields another handle to the same storage, so several processors
/// (or a processor and a reaper) can share it across tasks and threads. Each
/// operation holds the write lock for its whole check-and-set, which is what
/// makes the conditional transitions atomic.
#[derive(Clone, Default)]
pub struct InMemoryOutboxRepository {
    messages: Arc<RwLock<Store>>,
}

impl InMemoryOutboxRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a freshly created message. This stands in for the caller's
    /// own transaction: the message must be PENDING with zero attempts.
    pub fn append(&self, message: OutboxMessage) -> Result<(), RepositoryError> {
        let mut messages = self.write("append")?;
        insert_new(&mut messages, message)
    }

    /// Append several messages; nothing is stored if any of them is invalid.
    pub fn append_all(
        &self,
        batch: impl IntoIterator<Item = OutboxMessage>,
    ) -> Result<(), RepositoryError> {
        let batch: Vec<_> = batch.into_iter().collect();
        let mut messages = self.write("append")?;

        let mut staged = Store::with_capacity(batch.len());
        for message in batch {
            validate_append(&message)?;
            if messages.contains_key(&message.id) || staged.contains_key(&message.id) {
                return Err(RepositoryError::DuplicateId(message.id));
            }
            staged.insert(message.id, message);
        }
        messages.extend(staged);
        Ok(())
    }

    /// Every stored message, oldest first.
    pub fn snapshot(&self) -> Result<Vec<OutboxMessage>, RepositoryError> {
        let messages = self.read("snapshot")?;
        let mut all: Vec<_> = messages.values().cloned().collect();
        all.sort_by_key(|m| (m.occurred_at, m.id));
        Ok(all)
    }

    pub fn len(&self) -> Result<usize, RepositoryError> {
        Ok(self.read("len")?.len())
    }

    pub fn is_empty(&self) -> Result<bool, RepositoryError> {
        Ok(self.read("len")?.is_empty())
    }

    fn read(&self, operation: &'static str) -> Result<RwLockReadGuard<'_, Store>, RepositoryError> {
        self.messages
            .read()
            .map_err(|_| RepositoryError::LockPoisoned(operation))
    }

    fn write(
        &self,
        operation: &'static str,
    ) -> Result<RwLockWriteGuard<'_, Store>, RepositoryError> {
        self.messages
            .write()
            .map_err(|_| RepositoryError::LockPoisoned(operation))
    }

    /// Apply `apply` to the message only if it is currently in `from`.
    fn transition(
        &self,
        operation: &'static str,
        id: Uuid,
        from: OutboxStatus,
        apply: impl FnOnce(&mut OutboxMessage),
    ) -> Result<bool, RepositoryError> {
        let mut messages = self.write(operation)?;
        match messages.get_mut(&id) {
            Some(message) if message.status == from => {
                apply(message);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

fn validate_append(message: &OutboxMessage) -> Result<(), RepositoryError> {
    if message.status != OutboxStatus::Pending {
        return Err(RepositoryError::InvalidAppend {
            id: message.id,
            reason: format!("status is {}, expected PENDING", message.status),
        });
    }
    if message.attempts != 0 {
        return Err(RepositoryError::InvalidAppend {
            id: message.id,
            reason: format!("attempts is {}, expected 0", message.attempts),
        });
    }
    Ok(())
}

fn insert_new(messages: &mut Store, message: OutboxMessage) -> Result<(), RepositoryError> {
    validate_append(&message)?;
    if messages.contains_key(&message.id) {
        return Err(RepositoryError::DuplicateId(message.id));
    }
    messages.insert(message.id, message);
    Ok(())
}

fn record_failure(message: &mut OutboxMessage, status: OutboxStatus, reason: &str, attempts: u32) {
    message.status = status;
    message.last_error = Some(reason.to_string());
    message.attempts = message.attempts.max(attempts);
}

#[async_trait]
impl OutboxRepository for InMemoryOutboxRepository {
    async fn fetch_batch(
        &self,
        status: OutboxStatus,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>, RepositoryError> {
        let messages = self.read("fetch_batch")?;
        let mut matching: Vec<_> = messages
            .values()
            .filter(|m| m.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|m| (m.occurred_at, m.id));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn mark_processing(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<u32>, RepositoryError> {
        let mut messages = self.write("mark_processing")?;
        match messages.get_mut(&id) {
            Some(message) if message.status == OutboxStatus::Pending => {
                message.status = OutboxStatus::Processing;
                message.attempts = message.attempts.saturating_add(1);
                message.processing_at = Some(now);
                Ok(Some(message.attempts))
            }
            _ => Ok(None),
        }
    }

    async fn mark_published(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        self.transition("mark_published", id, OutboxStatus::Processing, |message| {
            message.status = OutboxStatus::Published;
            message.published_at = Some(now);
            message.last_error = None;
        })
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        reason: &str,
        attempts: u32,
    ) -> Result<bool, RepositoryError> {
        self.transition("mark_failed", id, OutboxStatus::Processing, |message| {
            record_failure(message, OutboxStatus::Failed, reason, attempts)
        })
    }

    async fn mark_dead(
        &self,
        id: Uuid,
        reason: &str,
        attempts: u32,
    ) -> Result<bool, RepositoryError> {
        self.transition("mark_dead", id, OutboxStatus::Processing, |message| {
            record_failure(message, OutboxStatus::Dead, reason, attempts)
        })
    }

    async fn mark_retryable(
        &self,
        id: Uuid,
        reason: &str,
        attempts: u32,
    ) -> Result<bool, RepositoryError> {
        self.transition("mark_retryable", id, OutboxStatus::Failed, |message| {
            record_failure(message, OutboxStatus::Pending, reason, attempts)
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OutboxMessage>, RepositoryError> {
        Ok(self.read("find_by_id")?.get(&id).cloned())
    }

    async fn count_by_status(&self, status: OutboxStatus) -> Result<u64, RepositoryError> {
        let messages = self.read("count_by_status")?;
        Ok(messages.values().filter(|m| m.status == status).count() as u64)
    }

    async fn delete_published_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut messages = self.write("delete_published_older_than")?;
        let before = messages.len();
        messages.retain(|_, m| {
            !(m.status == OutboxStatus::Published
                && m.published_at.is_some_and(|at| at < cutoff))
        });
        Ok((before - messages.len()) as u64)
    }

    async fn fetch_stuck(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>, RepositoryError> {
        let messages = self.read("fetch_stuck")?;
        let mut stuck: Vec<_> = messages
            .values()
            .filter(|m| is_stuck(m, cutoff))
            .cloned()
            .collect();
        stuck.sort_by_key(|m| (m.processing_at, m.id));
        stuck.truncate(limit);
        Ok(stuck)
    }

    async fn release_stuck(
        &self,
        id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut messages = self.write("release_stuck")?;
        match messages.get_mut(&id) {
            Some(message) if is_stuck(message, cutoff) => {
                message.status = OutboxStatus::Pending;
                message.processing_at = None;
                message.last_error = Some(RECLAIMED_REASON.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

fn is_stuck(message: &OutboxMessage, cutoff: DateTime<Utc>) -> bool {
    message.status == OutboxStatus::Processing
        && message.processing_at.is_some_and(|at| at <= cutoff)
}
