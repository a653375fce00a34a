// Domain Layer - Jobs, queues and capacity tokens

pub mod error;
pub mod failure;
pub mod job;
pub mod queue;
pub mod slot;

// Re-exports
pub use error::DomainError;
pub use failure::FailureRecord;
pub use job::{Job, JobArgs, JobRecord};
pub use queue::{validate_queue_name, QueueId, QueueSet, FAILED_QUEUE};
pub use slot::SlotToken;
