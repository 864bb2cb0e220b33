use std::time::Duration;

use crate::error::RepositoryError;

/// What happened to one fetched message during a `process_all` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Delivered to the sink.
    Published,
    /// Publish failed; the message is FAILED and waits for the retry scheduler.
    Failed,
    /// Publish failed on the last allowed attempt; the message is DEAD.
    Dead,
    /// Another worker claimed the message first.
    Skipped,
    /// Shutdown interrupted the publish; the message stays PROCESSING until
    /// the reaper releases it.
    Abandoned,
    /// Shutdown was requested before the message was claimed.
    Cancelled,
    /// The claim was released (by the reaper) before the outcome could be
    /// recorded; the message is PENDING again.
    Released,
    /// A storage call failed; the persisted state was left as it was.
    RepositoryError(RepositoryError),
}

/// Summary of one `process_all` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub fetched: usize,
    pub published: usize,
    pub failed: usize,
    pub dead: usize,
    pub skipped: usize,
    pub abandoned: usize,
    pub cancelled: usize,
    pub released: usize,
    pub errors: Vec<RepositoryError>,
    pub duration: Duration,
}

impl BatchReport {
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn from_outcomes(
        fetched: usize,
        outcomes: impl IntoIterator<Item = MessageOutcome>,
        duration: Duration,
    ) -> Self {
        let mut report = BatchReport {
            fetched,
            duration,
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                MessageOutcome::Published => report.published += 1,
                MessageOutcome::Failed => report.failed += 1,
                MessageOutcome::Dead => report.dead += 1,
                MessageOutcome::Skipped => report.skipped += 1,
                MessageOutcome::Abandoned => report.abandoned += 1,
                MessageOutcome::Cancelled => report.cancelled += 1,
                MessageOutcome::Released => report.released += 1,
                MessageOutcome::RepositoryError(err) => report.errors.push(err),
            }
        }
        report
    }

    /// Messages successfully published in this batch.
    pub fn processed(&self) -> usize {
        self.published
    }

    pub fn is_empty(&self) -> bool {
        self.fetched == 0
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
