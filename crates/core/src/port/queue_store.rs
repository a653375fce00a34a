// Queue Store Port (Interface)

use crate::domain::{JobRecord, QueueId};
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Poll interval of the default `blocking_pop` (stores without a native blocking pop)
pub const POP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Key-ordered list store with atomic counters
///
/// Every mutation must be atomic at the store level; the core never does
/// read-modify-write on store values.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Append an item to the tail of a queue (creates the queue implicitly)
    async fn push(&self, queue: &str, item: &JobRecord) -> Result<()>;

    /// Remove and return the head of a queue, `None` when empty (never an error)
    async fn pop(&self, queue: &str) -> Result<Option<JobRecord>>;

    /// Number of items currently in a queue
    async fn size(&self, queue: &str) -> Result<i64>;

    /// Store clock in epoch milliseconds
    async fn now(&self) -> Result<i64>;

    /// Atomically increment a counter, returning the new value
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Atomically decrement a counter, returning the new value
    async fn decr(&self, key: &str) -> Result<i64>;

    /// Current counter value, 0 when absent
    async fn get(&self, key: &str) -> Result<i64>;

    /// Remove a counter; true when a value existed
    async fn clear(&self, key: &str) -> Result<bool>;

    /// Pop the head of the first non-empty queue, in the given order
    ///
    /// Waits up to `timeout` for an item to appear. Returns the queue the item
    /// came from. The default polls `pop` every `POP_POLL_INTERVAL`; stores with
    /// a native blocking primitive override it.
    async fn blocking_pop(
        &self,
        queues: &[QueueId],
        timeout: Duration,
    ) -> Result<Option<(QueueId, JobRecord)>> {
        let deadline = Instant::now() + timeout;
        loop {
            for queue in queues {
                if let Some(item) = self.pop(queue).await? {
                    return Ok(Some((queue.clone(), item)));
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            sleep(POP_POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}

// ============================================================================
// In-Memory Implementation (tests, single-process embedding)
// ============================================================================

pub mod memory {
    use super::*;
    use crate::error::AppError;
    use crate::port::time_provider::SystemTimeProvider;
    use crate::port::TimeProvider;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
    use tokio::sync::Notify;

    /// Process-local queue store
    ///
    /// A single mutex guards each map, which makes every operation atomic.
    pub struct InMemoryQueueStore {
        queues: Mutex<HashMap<QueueId, VecDeque<String>>>,
        counters: Mutex<HashMap<String, i64>>,
        pushed: Notify,
        unavailable: AtomicBool,
        time_provider: Arc<dyn TimeProvider>,
    }

    impl InMemoryQueueStore {
        pub fn new() -> Self {
            Self::with_time_provider(Arc::new(SystemTimeProvider))
        }

        pub fn with_time_provider(time_provider: Arc<dyn TimeProvider>) -> Self {
            Self {
                queues: Mutex::new(HashMap::new()),
                counters: Mutex::new(HashMap::new()),
                pushed: Notify::new(),
                unavailable: AtomicBool::new(false),
                time_provider,
            }
        }

        /// Simulate a store outage: every operation fails with `AppError::Store`
        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        /// Snapshot of a queue's items, head first
        pub fn items(&self, queue: &str) -> Vec<JobRecord> {
            self.lock_queues()
                .get(queue)
                .map(|items| items.iter().cloned().map(JobRecord::from_raw).collect())
                .unwrap_or_default()
        }

        // Every operation is a single step, so a poisoned map is still consistent
        fn lock_queues(&self) -> MutexGuard<'_, HashMap<QueueId, VecDeque<String>>> {
            self.queues.lock().unwrap_or_else(PoisonError::into_inner)
        }

        fn lock_counters(&self) -> MutexGuard<'_, HashMap<String, i64>> {
            self.counters.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Panic while holding both locks, leaving them poisoned
        #[cfg(test)]
        pub(super) fn poison(&self) {
            std::thread::scope(|scope| {
                let _ = scope
                    .spawn(|| {
                        let _queues = self.queues.lock();
                        let _counters = self.counters.lock();
                        panic!("poisoning store locks");
                    })
                    .join();
            });
        }

        fn check_available(&self) -> Result<()> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(AppError::Store("in-memory store unavailable".to_string()));
            }
            Ok(())
        }

        fn pop_first(&self, queues: &[QueueId]) -> Option<(QueueId, JobRecord)> {
            let mut map = self.lock_queues();
            queues.iter().find_map(|queue| {
                map.get_mut(queue)
                    .and_then(|items| items.pop_front())
                    .map(|raw| (queue.clone(), JobRecord::from_raw(raw)))
            })
        }

        fn add(&self, key: &str, delta: i64) -> i64 {
            let mut counters = self.lock_counters();
            let value = counters.entry(key.to_string()).or_insert(0);
            *value += delta;
            *value
        }
    }

    impl Default for InMemoryQueueStore {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl QueueStore for InMemoryQueueStore {
        async fn push(&self, queue: &str, item: &JobRecord) -> Result<()> {
            self.check_available()?;
            self.lock_queues()
                .entry(queue.to_string())
                .or_default()
                .push_back(item.as_str().to_string());
            self.pushed.notify_waiters();
            Ok(())
        }

        async fn pop(&self, queue: &str) -> Result<Option<JobRecord>> {
            self.check_available()?;
            Ok(self
                .lock_queues()
                .get_mut(queue)
                .and_then(|items| items.pop_front())
                .map(JobRecord::from_raw))
        }

        async fn size(&self, queue: &str) -> Result<i64> {
            self.check_available()?;
            Ok(self
                .lock_queues()
                .get(queue)
                .map_or(0, |items| items.len() as i64))
        }

        async fn now(&self) -> Result<i64> {
            self.check_available()?;
            Ok(self.time_provider.now_millis())
        }

        async fn incr(&self, key: &str) -> Result<i64> {
            self.check_available()?;
            Ok(self.add(key, 1))
        }

        async fn decr(&self, key: &str) -> Result<i64> {
            self.check_available()?;
            Ok(self.add(key, -1))
        }

        async fn get(&self, key: &str) -> Result<i64> {
            self.check_available()?;
            Ok(self.lock_counters().get(key).copied().unwrap_or(0))
        }

        async fn clear(&self, key: &str) -> Result<bool> {
            self.check_available()?;
            Ok(self.lock_counters().remove(key).is_some())
        }

        async fn blocking_pop(
            &self,
            queues: &[QueueId],
            timeout: Duration,
        ) -> Result<Option<(QueueId, JobRecord)>> {
            let deadline = Instant::now() + timeout;
            loop {
                self.check_available()?;

                // Register interest before looking, so a push in between is not missed
                let notified = self.pushed.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if let Some(hit) = self.pop_first(queues) {
                    return Ok(Some(hit));
                }

                tokio::select! {
                    _ = &mut notified => continue,
                    _ = tokio::time::sleep_until(deadline) => return Ok(None),
                }
            }
        }
    }
}
