// Stat Counters - processed/failed accounting kept in the queue store

use crate::error::Result;
use crate::port::QueueStore;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Named integer counter backed by the store's atomic increment
///
/// Failures surface as `Err`; a returned 0 is always a real value.
#[derive(Clone)]
pub struct StatCounter {
    name: String,
    store: Arc<dyn QueueStore>,
}

impl StatCounter {
    pub fn new(name: impl Into<String>, store: Arc<dyn QueueStore>) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value, 0 if never set
    pub async fn get(&self) -> Result<i64> {
        self.store.get(&self.name).await
    }

    /// Add one, returning the new value
    pub async fn incr(&self) -> Result<i64> {
        self.store.incr(&self.name).await
    }

    /// Subtract one, returning the new value
    pub async fn decr(&self) -> Result<i64> {
        self.store.decr(&self.name).await
    }

    /// Reset to absent; true when a value existed
    pub async fn clear(&self) -> Result<bool> {
        self.store.clear(&self.name).await
    }
}

impl fmt::Debug for StatCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatCounter")
            .field("name", &self.name)
            .finish()
    }
}

/// Outcome of one job execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    Processed,
    Failed,
}

impl StatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatKind::Processed => "processed",
            StatKind::Failed => "failed",
        }
    }
}

/// Counter naming scheme
pub struct StatKey;

impl StatKey {
    /// Global counter: `processed` / `failed`
    pub fn global(kind: StatKind) -> String {
        kind.as_str().to_string()
    }

    /// Per-worker counter: `processed:worker:<id>`
    pub fn worker(kind: StatKind, worker_id: &str) -> String {
        format!("{}:worker:{}", kind.as_str(), worker_id)
    }

    /// Per-task counter: `failed:task:<name>`
    pub fn task(kind: StatKind, task: &str) -> String {
        format!("{}:task:{}", kind.as_str(), task)
    }
}

/// Records job outcomes into global, per-worker and per-task counters
#[derive(Clone)]
pub struct JobStats {
    store: Arc<dyn QueueStore>,
}

impl JobStats {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    pub fn counter(&self, name: impl Into<String>) -> StatCounter {
        StatCounter::new(name, self.store.clone())
    }

    /// Increment all counters for one outcome
    ///
    /// Store errors are logged and swallowed: accounting must not stop a worker.
    pub async fn record(&self, kind: StatKind, worker_id: &str, task: &str) {
        let keys = [
            StatKey::global(kind),
            StatKey::worker(kind, worker_id),
            StatKey::task(kind, task),
        ];
        for key in keys {
            if let Err(e) = self.counter(key.as_str()).incr().await {
                warn!(stat = %key, worker = %worker_id, error = %e, "Failed to record stat");
            }
        }
    }
}
