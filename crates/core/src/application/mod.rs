// Application Layer - Use Cases and Business Logic

pub mod dispatcher;
pub mod info;
pub mod producer;
pub mod reservation;
pub mod stat;
pub mod worker;

// Re-exports
pub use dispatcher::{DispatchMetrics, Dispatcher, DispatcherConfig, MetricsSnapshot};
pub use info::Summary;
pub use producer::{EnqueueRequest, Producer};
pub use reservation::{reserve_job, try_reserve_job, ReservationError};
pub use stat::{JobStats, StatCounter, StatKey, StatKind};
pub use worker::{shutdown_channel, ShutdownSender, ShutdownToken, Worker};
