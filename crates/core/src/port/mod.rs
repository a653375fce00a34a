// Port Layer - Interfaces for external dependencies

pub mod queue_store;
pub mod task;
pub mod time_provider; // For deterministic testing

// Re-exports
pub use queue_store::memory::InMemoryQueueStore;
pub use queue_store::QueueStore;
pub use task::{FnTask, TaskError, TaskHandler, TaskRegistry};
pub use time_provider::{SystemTimeProvider, TimeProvider};
