use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::publisher::PublishError;

/// A publish call, not yet started.
pub type PublishAction<'a> = BoxFuture<'a, Result<(), PublishError>>;

/// Decorator executed around every publish.
///
/// Implementations either run `action` and return its result, or reject the
/// call with an error of their own. Either way the processor treats the
/// result exactly like a direct publish result.
#[async_trait]
pub trait CircuitBreaker: Send + Sync {
    async fn execute(&self, action: PublishAction<'_>) -> Result<(), PublishError>;
}

/// Pass-through decorator; the default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBreaker;

#[async_trait]
impl CircuitBreaker for NoopBreaker {
    async fn execute(&self, action: PublishAction<'_>) -> Result<(), PublishError> {
        action.await
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;

    use super::*;

    #[tokio::test]
    async fn noop_passes_results_through() {
        let breaker = NoopBreaker;
        assert!(breaker.execute(async { Ok(()) }.boxed()).await.is_ok());

        let err = breaker
            .execute(async { Err(PublishError::Timeout) }.boxed())
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Timeout));
    }
}
