//! Optional decorators around the publish call.
//!
//! The processor hands each publish to a [`CircuitBreaker`] as a boxed
//! future. [`NoopBreaker`] simply awaits it, so the engine has no mandatory
//! resilience dependency; [`ConsecutiveFailureBreaker`] short-circuits calls
//! to a sink that keeps failing.

mod breaker;
mod consecutive;

pub use breaker::{CircuitBreaker, NoopBreaker, PublishAction};
pub use consecutive::{BreakerState, ConsecutiveFailureBreaker};
