//! Aggregate configuration for a deployment of the engine.

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::backoff::BackoffPolicy;
use crate::error::ConfigError;
use crate::processor::ProcessorConfig;
use crate::reaper::ReaperConfig;
use crate::retry::RetryConfig;

/// Everything the processor, retry scheduler and reaper need.
///
/// Loadable from any serde format, or from `OUTBOX_*` environment variables
/// via [`OutboxConfig::from_env`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxConfig {
    #[serde(default)]
    pub processor: ProcessorConfig,

    #[serde(default)]
    pub backoff: BackoffPolicy,

    #[serde(default)]
    pub reaper: ReaperConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl OutboxConfig {
    /// Read overrides from the process environment. Unset variables keep
    /// their defaults; unparsable ones are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with a caller-supplied lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = OutboxConfig::default();

        override_with(&lookup, "OUTBOX_BATCH_SIZE", &mut config.processor.batch_size)?;
        override_with(&lookup, "OUTBOX_MAX_ATTEMPTS", &mut config.processor.max_attempts)?;
        override_with(&lookup, "OUTBOX_CONCURRENCY", &mut config.processor.concurrency)?;
        override_with(
            &lookup,
            "OUTBOX_PUBLISH_TIMEOUT_MS",
            &mut config.processor.publish_timeout_ms,
        )?;
        override_with(&lookup, "OUTBOX_BACKOFF_BASE_MS", &mut config.backoff.base_delay_ms)?;
        override_with(&lookup, "OUTBOX_BACKOFF_MAX_MS", &mut config.backoff.max_delay_ms)?;
        override_with(
            &lookup,
            "OUTBOX_REAPER_STUCK_AFTER_MS",
            &mut config.reaper.stuck_after_ms,
        )?;
        override_with(&lookup, "OUTBOX_REAPER_BATCH_SIZE", &mut config.reaper.batch_size)?;
        override_with(&lookup, "OUTBOX_RETRY_BATCH_SIZE", &mut config.retry.batch_size)?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.processor.validate()?;
        self.backoff.validate()?;
        self.reaper.validate()?;
        self.retry.validate()?;

        if self.reaper.stuck_after_ms <= self.processor.publish_timeout_ms {
            return Err(ConfigError::invalid(
                "reaper.stuck_after_ms",
                format!(
                    "{} must exceed processor.publish_timeout_ms {}",
                    self.reaper.stuck_after_ms, self.processor.publish_timeout_ms
                ),
            ));
        }
        Ok(())
    }
}

fn override_with<F, T>(lookup: &F, var: &str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(var) else {
        return Ok(());
    };
    *slot = raw.trim().parse().map_err(|err: T::Err| ConfigError::Env {
        var: var.to_string(),
        reason: format!("cannot parse {raw:?}: {err}"),
    })?;
    Ok(())
}
