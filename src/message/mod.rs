mod message;
mod payload;
mod status;

pub use message::{Headers, OutboxMessage};
pub use payload::Payload;
pub use status::{OutboxStatus, ParseStatusError};
