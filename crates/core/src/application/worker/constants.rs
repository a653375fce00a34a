// Worker and dispatcher constants (no magic values)
use std::time::Duration;

/// Pause after a reservation store error before the next attempt (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Restarts allowed per worker before it is marked dead
pub const MAX_WORKER_RESTARTS: u32 = 3;

/// Pause before restarting a failed worker loop (100ms)
pub const WORKER_RESTART_BACKOFF: Duration = Duration::from_millis(100);

/// Delay between attempts to re-queue a job during shutdown (50ms)
pub const REQUEUE_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Attempts to re-queue one job during shutdown before it is logged as lost
pub const REQUEUE_MAX_ATTEMPTS: u32 = 5;
