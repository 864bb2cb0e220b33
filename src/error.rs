use thiserror::Error;
use uuid::Uuid;

/// Errors raised by an outbox repository.
///
/// A guard mismatch (message not in the expected state) is never an error:
/// the `mark_*` operations report it as `Ok(false)`. These variants describe
/// storage calls that could not determine an outcome at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("repository lock poisoned during {0}")]
    LockPoisoned(&'static str),

    #[error("outbox message {0} already exists")]
    DuplicateId(Uuid),

    #[error("cannot append outbox message {id}: {reason}")]
    InvalidAppend { id: Uuid, reason: String },

    #[error("storage error: {0}")]
    Storage(String),
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        RepositoryError::Storage(message.into())
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("environment variable {var}: {reason}")]
    Env { var: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
