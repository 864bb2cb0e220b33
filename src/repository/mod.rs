mod in_memory;
mod repository;

pub use in_memory::InMemoryOutboxRepository;
pub use repository::OutboxRepository;

/// `last_error` recorded when the reaper reverts an abandoned claim.
pub const RECLAIMED_REASON: &str = "reclaimed: processing timed out";
