// Worker - Job execution loop

pub mod constants;
mod panic_guard;
mod shutdown;

pub use panic_guard::{execute_guarded, panic_message, PanicGuardResult};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use super::stat::{JobStats, StatKind};
use crate::domain::{FailureRecord, Job, JobRecord, QueueSet, SlotToken, FAILED_QUEUE};
use crate::error::{AppError, Result};
use crate::port::{QueueStore, SystemTimeProvider, TaskError, TaskRegistry, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Worker identity: `"{pid}-{index}:{queue1,queue2,...}"`
pub fn worker_identity(index: usize, queues: &QueueSet) -> String {
    format!("{}-{}:{}", std::process::id(), index, queues)
}

/// Resources shared by every worker of one pool
pub struct WorkerContext {
    pub store: Arc<dyn QueueStore>,
    pub registry: Arc<TaskRegistry>,
    pub jobs: async_channel::Receiver<Job>,
    pub slots: mpsc::Sender<SlotToken>,
    pub idle_timeout: Duration,
    pub job_timeout: Option<Duration>,
}

/// Worker executes jobs pulled from the pool's shared job channel
#[derive(Clone)]
pub struct Worker {
    index: usize,
    id: String,
    token: SlotToken,
    stats: JobStats,
    ctx: Arc<WorkerContext>,
}

impl Worker {
    pub fn new(index: usize, queues: &QueueSet, ctx: Arc<WorkerContext>) -> Self {
        let id = worker_identity(index, queues);
        Self {
            index,
            token: SlotToken::new(id.clone()),
            stats: JobStats::new(ctx.store.clone()),
            id,
            ctx,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The token this worker hands back after each job
    pub fn token(&self) -> &SlotToken {
        &self.token
    }

    /// Run worker loop with graceful shutdown support
    ///
    /// Shutdown is observed only between jobs; a running handler always finishes.
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(worker = %self.id, "Worker started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    info!(worker = %self.id, "Worker shutting down");
                    break;
                }
                received = self.ctx.jobs.recv() => {
                    let Ok(job) = received else {
                        info!(worker = %self.id, "Job channel closed");
                        break;
                    };
                    let lease = SlotLease::new(&self.ctx.slots, &self.token);
                    self.process(job).await;
                    if !lease.release() && !shutdown.is_shutdown() {
                        return Err(AppError::Internal(format!(
                            "slot channel closed under worker {}",
                            self.id
                        )));
                    }
                }
                _ = sleep(self.ctx.idle_timeout) => {
                    debug!(worker = %self.id, "Worker idle");
                }
            }
        }
        info!(worker = %self.id, "Worker stopped");
        Ok(())
    }

    /// Execute one job and record its outcome
    pub async fn process(&self, job: Job) {
        let Some(handler) = self.ctx.registry.get(&job.name) else {
            warn!(worker = %self.id, job = %job.name, queue = %job.queue, "No handler registered for job");
            self.record_failure(&job, &TaskError::UnknownTask(job.name.clone()))
                .await;
            return;
        };

        debug!(worker = %self.id, job = %job.name, queue = %job.queue, "Processing job");

        let args = job.args.clone();
        let outcome = execute_guarded(
            async move { handler.perform(&args).await },
            self.ctx.job_timeout,
        )
        .await;

        let result = match outcome {
            PanicGuardResult::Success(result) => result,
            PanicGuardResult::Panicked(msg) => Err(TaskError::Panicked(msg)),
            PanicGuardResult::TimedOut(limit) => Err(TaskError::Timeout(limit)),
        };

        match result {
            Ok(()) => {
                self.stats
                    .record(StatKind::Processed, &self.id, &job.name)
                    .await;
                info!(worker = %self.id, job = %job.name, queue = %job.queue, "Job completed");
            }
            Err(e) => {
                error!(worker = %self.id, job = %job.name, queue = %job.queue, error = %e, "Job failed");
                self.record_failure(&job, &e).await;
                if job.retry {
                    schedule_retry(self.ctx.store.clone(), job, self.id.clone());
                }
            }
        }
    }

    async fn record_failure(&self, job: &Job, error: &TaskError) {
        self.stats.record(StatKind::Failed, &self.id, &job.name).await;

        let failed_at = match self.ctx.store.now().await {
            Ok(now) => now,
            Err(e) => {
                warn!(worker = %self.id, error = %e, "Store clock unavailable, using local time");
                SystemTimeProvider.now_millis()
            }
        };

        let failure = FailureRecord::new(job, error.to_string(), self.id.clone(), failed_at);
        let pushed = match failure.to_record() {
            Ok(record) => self.ctx.store.push(FAILED_QUEUE, &record).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = pushed {
            warn!(worker = %self.id, job = %job.name, error = %e, "Failed to store failure record");
        }
    }
}

/// Re-push a failed job to its origin queue after `retry_every`, without waiting
///
/// The timer is detached from the pool: it still fires after the dispatcher stops
/// as long as the runtime is alive.
pub fn schedule_retry(store: Arc<dyn QueueStore>, job: Job, worker_id: String) {
    info!(
        worker = %worker_id,
        job = %job.name,
        queue = %job.queue,
        delay_secs = job.retry_every().as_secs(),
        "Retry scheduled"
    );
    tokio::spawn(async move {
        sleep(job.retry_every()).await;
        let pushed = match JobRecord::encode(&job) {
            Ok(record) => store.push(&job.queue, &record).await,
            Err(e) => Err(e.into()),
        };
        match pushed {
            Ok(()) => debug!(worker = %worker_id, job = %job.name, queue = %job.queue, "Job re-queued for retry"),
            Err(e) => error!(worker = %worker_id, job = %job.name, queue = %job.queue, error = %e, "Retry re-push failed"),
        }
    });
}

/// Capacity held by a worker while it runs a job
///
/// Handing the token back on drop keeps the pool's capacity intact even when
/// the worker loop unwinds mid-job.
struct SlotLease<'a> {
    slots: &'a mpsc::Sender<SlotToken>,
    token: Option<SlotToken>,
}

impl<'a> SlotLease<'a> {
    fn new(slots: &'a mpsc::Sender<SlotToken>, token: &SlotToken) -> Self {
        Self {
            slots,
            token: Some(token.clone()),
        }
    }

    /// Return the token; false when the dispatcher is gone
    fn release(mut self) -> bool {
        self.give_back()
    }

    fn give_back(&mut self) -> bool {
        match self.token.take() {
            // Capacity equals the number of tokens, so a full channel is impossible
            Some(token) => self.slots.try_send(token).is_ok(),
            None => true,
        }
    }
}

impl Drop for SlotLease<'_> {
    fn drop(&mut self) {
        self.give_back();
    }
}
