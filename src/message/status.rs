use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of an outbox message.
///
/// ```text
/// PENDING --claim--> PROCESSING --ok--> PUBLISHED
/// PROCESSING --error, attempts < max--> FAILED --backoff--> PENDING
/// PROCESSING --error, attempts >= max--> DEAD
/// PROCESSING --stuck--> PENDING
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    #[default]
    Pending,
    Processing,
    Published,
    Failed,
    Dead,
}

impl OutboxStatus {
    pub const ALL: [OutboxStatus; 5] = [
        OutboxStatus::Pending,
        OutboxStatus::Processing,
        OutboxStatus::Published,
        OutboxStatus::Failed,
        OutboxStatus::Dead,
    ];

    /// PUBLISHED and DEAD accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, OutboxStatus::Published | OutboxStatus::Dead)
    }

    pub fn can_transition_to(self, next: OutboxStatus) -> bool {
        use OutboxStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Published)
                | (Processing, Failed)
                | (Processing, Dead)
                | (Processing, Pending)
                | (Failed, Pending)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Processing => "PROCESSING",
            OutboxStatus::Published => "PUBLISHED",
            OutboxStatus::Failed => "FAILED",
            OutboxStatus::Dead => "DEAD",
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown outbox status `{0}`")]
pub struct ParseStatusError(pub String);

impl FromStr for OutboxStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutboxStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}
