//! The claim -> publish -> transition loop.
//!
//! An external trigger calls [`OutboxProcessor::process_all`] on a timer, from
//! as many process instances as needed. Instances never coordinate with each
//! other; the repository's atomic claim is the only arbiter.

mod config;
mod processor;
mod report;

pub use config::ProcessorConfig;
pub use processor::OutboxProcessor;
pub use report::{BatchReport, MessageOutcome};
