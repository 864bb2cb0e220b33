use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_CONCURRENCY: usize = 1;
const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 30_000;

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_publish_timeout_ms() -> u64 {
    DEFAULT_PUBLISH_TIMEOUT_MS
}

/// Settings for [`OutboxProcessor`](super::OutboxProcessor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Most messages fetched per `process_all` call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// The claim on which a failing message is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Messages of one batch in flight at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Deadline for a single publish; `0` disables it.
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            concurrency: DEFAULT_CONCURRENCY,
            publish_timeout_ms: DEFAULT_PUBLISH_TIMEOUT_MS,
        }
    }
}

impl ProcessorConfig {
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_publish_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.publish_timeout_ms = timeout.map_or(0, |t| t.as_millis() as u64);
        self
    }

    pub fn publish_timeout(&self) -> Option<Duration> {
        (self.publish_timeout_ms > 0).then(|| Duration::from_millis(self.publish_timeout_ms))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("processor.batch_size", "must be greater than zero"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "processor.max_attempts",
                "must be greater than zero",
            ));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::invalid(
                "processor.concurrency",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ProcessorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.publish_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn builder() {
        let config = ProcessorConfig::default()
            .with_batch_size(5)
            .with_max_attempts(2)
            .with_concurrency(4)
            .with_publish_timeout(None);

        assert_eq!(config.batch_size, 5);
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.publish_timeout(), None);
    }

    #[test]
    fn rejects_zero_values() {
        for config in [
            ProcessorConfig::default().with_batch_size(0),
            ProcessorConfig::default().with_max_attempts(0),
            ProcessorConfig::default().with_concurrency(0),
        ] {
            assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
        }
    }

    #[test]
    fn deserializes_partial_documents() {
        let config: ProcessorConfig = serde_json::from_str(r#"{"max_attempts": 3}"#).unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
    }
}
