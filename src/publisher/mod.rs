//! Sinks the engine publishes to.
//!
//! - `OutboxPublisher` - the contract the processor calls for each claimed message
//! - `LogPublisher` - emits one `tracing` event per message, or appends the line to a shared buffer
//! - `LocalEmitterPublisher` - in-process fan-out (requires the `emitter` feature)

mod error;
#[cfg(feature = "emitter")]
mod emitter;
mod log;
mod publisher;

pub use error::{PublishError, MAX_REASON_LEN};
#[cfg(feature = "emitter")]
pub use emitter::{EmittedMessage, LocalEmitterPublisher};
pub use log::LogPublisher;
pub use publisher::OutboxPublisher;
