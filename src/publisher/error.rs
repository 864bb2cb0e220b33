use std::error::Error as StdError;

use thiserror::Error;

/// Longest diagnostic string stored as a message's `last_error`.
pub const MAX_REASON_LEN: usize = 256;

/// Error returned by a publisher.
///
/// The processor does not branch on the variant: every error is a failed
/// attempt. The variant only shapes the diagnostic reason.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("rejected by broker: {0}")]
    Rejected(String),

    #[error("publish timed out")]
    Timeout,

    #[error("circuit breaker `{name}` is open")]
    CircuitOpen { name: String },

    #[error("{0}")]
    Other(Box<dyn StdError + Send + Sync>),
}

impl PublishError {
    pub fn other(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        PublishError::Other(err.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PublishError::ConnectionFailed(_) => "ConnectionFailed",
            PublishError::Rejected(_) => "Rejected",
            PublishError::Timeout => "Timeout",
            PublishError::CircuitOpen { .. } => "CircuitOpen",
            PublishError::Other(_) => "Other",
        }
    }

    /// Short, single-line diagnostic suitable for persisting.
    pub fn reason(&self) -> String {
        let line = format!("{}: {}", self.kind(), self);
        let line = line.lines().next().unwrap_or_default();
        truncate(line, MAX_REASON_LEN)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}
