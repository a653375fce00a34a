// Job Reservation - blocking pop across an ordered queue set

use super::worker::ShutdownToken;
use crate::domain::{Job, QueueSet};
use crate::port::QueueStore;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReservationError {
    #[error("store failure: {0}")]
    Store(String),

    #[error("malformed record in queue '{queue}': {reason}")]
    Malformed { queue: String, reason: String },
}

/// One reservation attempt
///
/// Blocks for at most `block`. Queues are tried in configuration order, so the
/// first queue holding an item always wins.
pub async fn try_reserve_job(
    store: &dyn QueueStore,
    queues: &QueueSet,
    block: Duration,
) -> Result<Option<Job>, ReservationError> {
    let hit = store
        .blocking_pop(queues.names(), block)
        .await
        .map_err(|e| ReservationError::Store(e.to_string()))?;

    let Some((queue, record)) = hit else {
        return Ok(None);
    };

    record
        .decode()
        .map(Some)
        .map_err(|e| ReservationError::Malformed {
            queue,
            reason: e.to_string(),
        })
}

/// Reserve the next job, retrying until one arrives
///
/// Timeouts retry immediately and malformed records are dropped with a warning.
/// Store errors go back to the caller. Returns `None` once shutdown is signalled.
///
/// Shutdown is checked between attempts, never during a pop: an item the store
/// already handed out is returned to the caller instead of being lost.
pub async fn reserve_job(
    store: &dyn QueueStore,
    queues: &QueueSet,
    worker_id: &str,
    block: Duration,
    shutdown: &ShutdownToken,
) -> Result<Option<Job>, ReservationError> {
    loop {
        if shutdown.is_shutdown() {
            return Ok(None);
        }

        match try_reserve_job(store, queues, block).await {
            Ok(Some(job)) => {
                debug!(worker = %worker_id, queue = %job.queue, job = %job.name, "Job reserved");
                return Ok(Some(job));
            }
            Ok(None) => continue,
            Err(ReservationError::Malformed { queue, reason }) => {
                warn!(worker = %worker_id, queue = %queue, error = %reason, "Skipping malformed job record");
            }
            Err(e) => return Err(e),
        }
    }
}
