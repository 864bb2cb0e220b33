//! Exponential backoff for the retry path.
//!
//! ```text
//! attempts    delay (base = 1s, ceiling = 5min)
//! ───────────────────────────────────────────────
//!     0            1s
//!     1            2s
//!     2            4s
//!     5           32s
//!     9          300s   (capped)
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
const DEFAULT_MAX_DELAY_MS: u64 = 300_000;

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}

fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

/// Pure, deterministic retry policy: `delay = base * 2^attempts`, capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, ceiling: Duration) -> Self {
        Self {
            base_delay_ms: base.as_millis() as u64,
            max_delay_ms: ceiling.as_millis() as u64,
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_delay_ms == 0 {
            return Err(ConfigError::invalid(
                "backoff.base_delay_ms",
                "must be greater than zero",
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ConfigError::invalid(
                "backoff.max_delay_ms",
                format!(
                    "{} is below base_delay_ms {}",
                    self.max_delay_ms, self.base_delay_ms
                ),
            ));
        }
        Ok(())
    }

    /// Whether a message that has been attempted `attempts` times may be tried again.
    pub fn should_retry(attempts: u32, max_attempts: u32) -> bool {
        attempts < max_attempts
    }

    pub fn delay_for(&self, attempts: u32) -> Duration {
        let delay_ms = 1u64
            .checked_shl(attempts)
            .and_then(|factor| self.base_delay_ms.checked_mul(factor))
            .unwrap_or(u64::MAX)
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    pub fn next_eligible_at(&self, last_attempt_at: DateTime<Utc>, attempts: u32) -> DateTime<Utc> {
        let delay = chrono::Duration::from_std(self.delay_for(attempts))
            .unwrap_or(chrono::Duration::MAX);
        last_attempt_at
            .checked_add_signed(delay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_eligible(
        &self,
        last_attempt_at: DateTime<Utc>,
        attempts: u32,
        now: DateTime<Utc>,
    ) -> bool {
        self.next_eligible_at(last_attempt_at, attempts) <= now
    }
}
