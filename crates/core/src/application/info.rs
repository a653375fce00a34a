// Info - aggregated backlog and counter view for operators

use super::stat::{StatKey, StatKind};
use crate::domain::{QueueId, FAILED_QUEUE};
use crate::error::Result;
use crate::port::QueueStore;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Per-queue backlog, in the order asked for
    pub queues: Vec<(QueueId, i64)>,
    /// Sum of the per-queue backlogs
    pub pending: i64,
    pub processed: i64,
    pub failed: i64,
    /// Length of the failure list
    pub failures: i64,
}

/// Collect queue sizes and global counters
pub async fn summary(store: &dyn QueueStore, queues: &[QueueId]) -> Result<Summary> {
    let mut sizes = Vec::with_capacity(queues.len());
    for queue in queues {
        sizes.push((queue.clone(), store.size(queue).await?));
    }

    Ok(Summary {
        pending: sizes.iter().map(|(_, size)| size).sum(),
        queues: sizes,
        processed: store.get(&StatKey::global(StatKind::Processed)).await?,
        failed: store.get(&StatKey::global(StatKind::Failed)).await?,
        failures: store.size(FAILED_QUEUE).await?,
    })
}
