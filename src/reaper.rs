//! Recovery for claims whose worker went away.
//!
//! A worker that crashes, or is shut down mid-publish, leaves its message
//! PROCESSING with nobody to finish it. The reaper returns such messages to
//! PENDING once their claim is older than `stuck_after`. Attempts are kept:
//! once a message's claims have used up `max_attempts` without recording an
//! outcome, the processor dead-letters it on its next claim instead of
//! publishing again.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, RepositoryError};
use crate::repository::OutboxRepository;

const TARGET: &str = "sourced_outbox::reaper";

const DEFAULT_STUCK_AFTER_MS: u64 = 300_000;
const DEFAULT_BATCH_SIZE: usize = 100;

fn default_stuck_after_ms() -> u64 {
    DEFAULT_STUCK_AFTER_MS
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaperConfig {
    /// How old a claim must be before it is considered abandoned. Must
    /// comfortably exceed the longest legitimate publish.
    #[serde(default = "default_stuck_after_ms")]
    pub stuck_after_ms: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            stuck_after_ms: DEFAULT_STUCK_AFTER_MS,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl ReaperConfig {
    pub fn with_stuck_after(mut self, stuck_after: Duration) -> Self {
        self.stuck_after_ms = stuck_after.as_millis() as u64;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn stuck_after(&self) -> Duration {
        Duration::from_millis(self.stuck_after_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stuck_after_ms == 0 {
            return Err(ConfigError::invalid(
                "reaper.stuck_after_ms",
                "must be greater than zero",
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("reaper.batch_size", "must be greater than zero"));
        }
        Ok(())
    }
}

/// Result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaperReport {
    /// Stuck messages found.
    pub scanned: usize,
    /// Messages returned to PENDING.
    pub reclaimed: usize,
    /// Messages whose worker finished between the scan and the release.
    pub lost_race: usize,
    pub errors: Vec<RepositoryError>,
    pub duration: Duration,
}

impl ReaperReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

pub struct Reaper<R> {
    repository: R,
    config: ReaperConfig,
}

impl<R> Reaper<R> {
    pub fn new(repository: R, config: ReaperConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { repository, config })
    }

    pub fn config(&self) -> &ReaperConfig {
        &self.config
    }
}

impl<R: OutboxRepository> Reaper<R> {
    pub async fn sweep(&self) -> Result<ReaperReport, RepositoryError> {
        self.sweep_at(Utc::now()).await
    }

    /// Release every claim made at or before `now - stuck_after`, up to the
    /// batch size. Only the initial scan can fail the sweep; a failed release
    /// is recorded and the sweep moves on.
    #[tracing::instrument(name = "outbox.reaper_sweep", skip_all, fields(now = %now))]
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<ReaperReport, RepositoryError> {
        let started = Instant::now();
        let stuck_after =
            chrono::Duration::from_std(self.config.stuck_after()).unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(stuck_after).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let stuck = self
            .repository
            .fetch_stuck(cutoff, self.config.batch_size)
            .await
            .map_err(|err| {
                warn!(target: TARGET, error = %err, "failed to scan for stuck messages");
                err
            })?;

        let mut report = ReaperReport {
            scanned: stuck.len(),
            ..Default::default()
        };

        for message in stuck {
            match self.repository.release_stuck(message.id, cutoff).await {
                Ok(true) => {
                    warn!(
                        target: TARGET,
                        message_id = %message.id,
                        topic = %message.topic,
                        attempt = message.attempts,
                        claimed_at = ?message.processing_at,
                        "reclaimed stuck message"
                    );
                    report.reclaimed += 1;
                }
                Ok(false) => {
                    debug!(
                        target: TARGET,
                        message_id = %message.id,
                        "stuck message was finished before it could be released"
                    );
                    report.lost_race += 1;
                }
                Err(err) => {
                    warn!(
                        target: TARGET,
                        message_id = %message.id,
                        error = %err,
                        "failed to release stuck message"
                    );
                    report.errors.push(err);
                }
            }
        }

        report.duration = started.elapsed();
        if report.scanned > 0 {
            info!(
                target: TARGET,
                scanned = report.scanned,
                reclaimed = report.reclaimed,
                lost_race = report.lost_race,
                errors = report.errors.len(),
                "reaper sweep finished"
            );
        }
        Ok(report)
    }
}
