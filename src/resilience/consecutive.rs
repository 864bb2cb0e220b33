use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{CircuitBreaker, PublishAction};
use crate::publisher::PublishError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls flow through.
    Closed,
    /// Calls are rejected until the cool-down elapses.
    Open,
    /// One trial call is let through to probe the sink.
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_started: Option<Instant>,
}

/// Circuit breaker that opens after a run of consecutive failures.
///
/// Closed -> Open after `failure_threshold` failures in a row. While open,
/// calls are rejected with [`PublishError::CircuitOpen`] without running.
/// After `open_for` a single trial is admitted (HalfOpen): success closes the
/// circuit, failure re-opens it. A trial that never reports back (its future
/// was dropped) is superseded after another `open_for`.
#[derive(Debug)]
pub struct ConsecutiveFailureBreaker {
    name: String,
    failure_threshold: u32,
    open_for: Duration,
    inner: Mutex<Inner>,
}

impl ConsecutiveFailureBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, open_for: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            open_for,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_started: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_started = None;
    }

    // State is plain data, so a panic elsewhere cannot leave it inconsistent.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self) -> Result<(), PublishError> {
        let mut inner = self.lock();
        let now = Instant::now();
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let cooled = inner
                    .opened_at
                    .map_or(true, |at| now.duration_since(at) >= self.open_for);
                if cooled {
                    inner.state = BreakerState::HalfOpen;
                    inner.trial_started = Some(now);
                    Ok(())
                } else {
                    Err(self.rejection())
                }
            }
            BreakerState::HalfOpen => {
                let trial_abandoned = inner
                    .trial_started
                    .map_or(true, |at| now.duration_since(at) >= self.open_for);
                if trial_abandoned {
                    inner.trial_started = Some(now);
                    Ok(())
                } else {
                    Err(self.rejection())
                }
            }
        }
    }

    fn record(&self, success: bool) {
        let mut inner = self.lock();
        if success {
            inner.state = BreakerState::Closed;
            inner.consecutive_failures = 0;
            inner.opened_at = None;
            inner.trial_started = None;
            return;
        }

        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        if inner.state == BreakerState::HalfOpen
            || inner.consecutive_failures >= self.failure_threshold
        {
            if inner.state != BreakerState::Open {
                tracing::warn!(
                    target: "sourced_outbox::resilience",
                    breaker = %self.name,
                    failures = inner.consecutive_failures,
                    "circuit opened"
                );
            }
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
            inner.trial_started = None;
        }
    }

    fn rejection(&self) -> PublishError {
        PublishError::CircuitOpen {
            name: self.name.clone(),
        }
    }
}

#[async_trait]
impl CircuitBreaker for ConsecutiveFailureBreaker {
    async fn execute(&self, action: PublishAction<'_>) -> Result<(), PublishError> {
        self.admit()?;
        let result = action.await;
        self.record(result.is_ok());
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use futures::FutureExt;

    use super::*;

    fn failing(calls: Arc<AtomicUsize>) -> PublishAction<'static> {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(PublishError::ConnectionFailed("down".into()))
        }
        .boxed()
    }

    fn succeeding(calls: Arc<AtomicUsize>) -> PublishAction<'static> {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        .boxed()
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_and_short_circuits() {
        let breaker = ConsecutiveFailureBreaker::new("broker", 2, Duration::from_secs(30));
        let calls = Arc::new(AtomicUsize::new(0));

        assert!(breaker.execute(failing(calls.clone())).await.is_err());
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.execute(failing(calls.clone())).await.is_err());
        assert_eq!(breaker.state(), BreakerState::Open);

        let err = breaker.execute(succeeding(calls.clone())).await.unwrap_err();
        assert!(matches!(err, PublishError::CircuitOpen { ref name } if name == "broker"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_the_failure_run() {
        let breaker = ConsecutiveFailureBreaker::new("broker", 2, Duration::from_secs(30));
        let calls = Arc::new(AtomicUsize::new(0));

        let _ = breaker.execute(failing(calls.clone())).await;
        breaker.execute(succeeding(calls.clone())).await.unwrap();
        let _ = breaker.execute(failing(calls.clone())).await;
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_trial_closes_on_success() {
        let breaker = ConsecutiveFailureBreaker::new("broker", 1, Duration::from_secs(30));
        let calls = Arc::new(AtomicUsize::new(0));

        let _ = breaker.execute(failing(calls.clone())).await;
        assert_eq!(breaker.state(), BreakerState::Open);

        tokio::time::advance(Duration::from_secs(31)).await;
        breaker.execute(succeeding(calls.clone())).await.unwrap();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_trial_reopens_on_failure() {
        let breaker = ConsecutiveFailureBreaker::new("broker", 3, Duration::from_secs(30));
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let _ = breaker.execute(failing(calls.clone())).await;
        }
        tokio::time::advance(Duration::from_secs(30)).await;

        let _ = breaker.execute(failing(calls.clone())).await;
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(matches!(
            breaker.execute(succeeding(calls.clone())).await,
            Err(PublishError::CircuitOpen { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_closes_the_circuit() {
        let breaker = ConsecutiveFailureBreaker::new("broker", 1, Duration::from_secs(30));
        let _ = breaker.execute(failing(Arc::new(AtomicUsize::new(0)))).await;
        breaker.reset();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.name(), "broker");
    }
}
