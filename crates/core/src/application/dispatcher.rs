// Dispatcher - matches a bounded worker pool against the queue backlog
//
// Slot tokens (one per worker) bound the number of live reservations. The
// dispatch loop turns each token into a reservation task; reserved jobs go
// through one bounded channel shared by every worker.

use super::reservation::reserve_job;
use super::worker::constants::{
    ERROR_RECOVERY_SLEEP_DURATION, MAX_WORKER_RESTARTS, REQUEUE_MAX_ATTEMPTS, REQUEUE_RETRY_DELAY,
    WORKER_RESTART_BACKOFF,
};
use super::worker::{
    execute_guarded, shutdown_channel, PanicGuardResult, ShutdownToken, Worker, WorkerContext,
};
use crate::domain::{Job, JobRecord, QueueSet, SlotToken};
use crate::error::{AppError, Result};
use crate::port::{QueueStore, TaskRegistry};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Default upper bound of one blocking pop attempt
pub const DEFAULT_BLPOP_MAX_BLOCK_TIME: Duration = Duration::from_secs(1);

/// Default idle interval of the dispatch loop and of workers
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub max_workers: usize,
    /// Priority order: earlier queues win
    pub queues: QueueSet,
    pub blpop_max_block_time: Duration,
    pub dispatcher_timeout: Duration,
    pub worker_timeout: Duration,
    pub job_timeout: Option<Duration>,
}

impl DispatcherConfig {
    pub fn new(max_workers: usize, queues: QueueSet) -> Self {
        Self {
            max_workers,
            queues,
            blpop_max_block_time: DEFAULT_BLPOP_MAX_BLOCK_TIME,
            dispatcher_timeout: DEFAULT_IDLE_TIMEOUT,
            worker_timeout: DEFAULT_IDLE_TIMEOUT,
            job_timeout: None,
        }
    }
}

/// Lock-free counters describing the dispatch loop, readable at any time
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    reserved: AtomicU64,
    requeued: AtomicU64,
    worker_restarts: AtomicU64,
    dead_workers: AtomicUsize,
}

/// Point-in-time copy of `DispatchMetrics`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub in_flight: usize,
    pub peak_in_flight: usize,
    pub reserved: u64,
    pub requeued: u64,
    pub worker_restarts: u64,
    pub dead_workers: usize,
}

impl DispatchMetrics {
    /// Reservation tasks currently alive
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Jobs taken out of the store by reservations
    pub fn reserved(&self) -> u64 {
        self.reserved.load(Ordering::SeqCst)
    }

    /// Jobs pushed back to their origin queue during shutdown
    pub fn requeued(&self) -> u64 {
        self.requeued.load(Ordering::SeqCst)
    }

    pub fn worker_restarts(&self) -> u64 {
        self.worker_restarts.load(Ordering::SeqCst)
    }

    pub fn dead_workers(&self) -> usize {
        self.dead_workers.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            in_flight: self.in_flight(),
            peak_in_flight: self.peak_in_flight(),
            reserved: self.reserved(),
            requeued: self.requeued(),
            worker_restarts: self.worker_restarts(),
            dead_workers: self.dead_workers(),
        }
    }
}

/// Marks one reservation task as in flight for as long as it lives
struct InFlight(Arc<DispatchMetrics>);

impl InFlight {
    fn enter(metrics: Arc<DispatchMetrics>) -> Self {
        let now = metrics.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        metrics.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(metrics)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Owns the worker pool and runs the dispatch loop
pub struct Dispatcher {
    config: DispatcherConfig,
    store: Arc<dyn QueueStore>,
    metrics: Arc<DispatchMetrics>,
}

impl Dispatcher {
    /// Validate pool parameters
    ///
    /// # Errors
    /// `AppError::PoolConstruction` when `max_workers` is 0 or the queue set is empty
    pub fn new(store: Arc<dyn QueueStore>, config: DispatcherConfig) -> Result<Self> {
        if config.max_workers == 0 {
            return Err(AppError::PoolConstruction(
                "max_workers must be greater than 0".to_string(),
            ));
        }
        if config.queues.is_empty() {
            return Err(AppError::PoolConstruction(
                "at least one queue is required".to_string(),
            ));
        }
        Ok(Self {
            config,
            store,
            metrics: Arc::new(DispatchMetrics::default()),
        })
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<DispatchMetrics> {
        self.metrics.clone()
    }

    /// Run the pool until `shutdown` fires or every worker is dead
    ///
    /// Returns once every worker and the dispatch loop have exited and jobs still
    /// buffered in the job channel have been pushed back to their queues.
    pub async fn run(&self, registry: TaskRegistry, shutdown: ShutdownToken) -> Result<()> {
        let max_workers = self.config.max_workers;
        let (slot_tx, slot_rx) = mpsc::channel::<SlotToken>(max_workers);
        let (job_tx, job_rx) = async_channel::bounded::<Job>(max_workers);

        let ctx = Arc::new(WorkerContext {
            store: self.store.clone(),
            registry: Arc::new(registry),
            jobs: job_rx.clone(),
            slots: slot_tx,
            idle_timeout: self.config.worker_timeout,
            job_timeout: self.config.job_timeout,
        });

        info!(
            workers = max_workers,
            queues = %self.config.queues,
            tasks = ?ctx.registry.names(),
            "Dispatcher starting"
        );

        let mut workers = JoinSet::new();
        for index in 1..=max_workers {
            let worker = Worker::new(index, &self.config.queues, ctx.clone());
            ctx.slots.try_send(worker.token().clone()).map_err(|e| {
                AppError::Internal(format!("failed to mint slot token: {}", e))
            })?;
            workers.spawn(supervise(worker, shutdown.clone(), self.metrics.clone()));
        }
        // Workers own the only slot senders from here on
        drop(ctx);

        self.dispatch(slot_rx, job_tx, shutdown).await;

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker supervisor aborted");
            }
        }

        self.requeue_buffered(&job_rx).await;

        info!(metrics = ?self.metrics.snapshot(), "Dispatcher stopped");
        Ok(())
    }

    /// The dispatch loop: one reservation per slot token
    ///
    /// Reservations get their own shutdown signal, fired whenever the loop ends,
    /// so they stop even when the loop ends because every worker died.
    async fn dispatch(
        &self,
        mut slots: mpsc::Receiver<SlotToken>,
        jobs: async_channel::Sender<Job>,
        mut shutdown: ShutdownToken,
    ) {
        let mut reservations = JoinSet::new();
        let (stop_reservations, reservation_shutdown) = shutdown_channel();
        // Slots taken out of circulation, one per dead worker
        let mut retired = 0;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    info!("Dispatcher shutting down");
                    break;
                }
                Some(joined) = reservations.join_next(), if !reservations.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Reservation task aborted");
                    }
                }
                token = slots.recv() => {
                    let Some(token) = token else {
                        error!("All workers are dead, dispatcher stopping");
                        break;
                    };
                    if self.metrics.dead_workers() > retired {
                        retired += 1;
                        warn!(slot = %token, retired, "Slot retired after worker death");
                        continue;
                    }
                    debug!(slot = %token, "Slot available, reserving");
                    let reservation = Reservation {
                        store: self.store.clone(),
                        queues: self.config.queues.clone(),
                        block: self.config.blpop_max_block_time,
                        jobs: jobs.clone(),
                        shutdown: reservation_shutdown.clone(),
                        metrics: self.metrics.clone(),
                        _in_flight: InFlight::enter(self.metrics.clone()),
                    };
                    reservations.spawn(reservation.run(token));
                }
                _ = sleep(self.config.dispatcher_timeout) => {
                    info!(
                        in_flight = self.metrics.in_flight(),
                        queues = %self.config.queues,
                        "Dispatcher idle"
                    );
                }
            }
        }

        // Reservations see the shutdown between pops and hand back what they hold
        stop_reservations.shutdown();
        while let Some(joined) = reservations.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Reservation task aborted");
            }
        }
    }

    /// Push jobs left in the job channel back to their origin queues
    async fn requeue_buffered(&self, jobs: &async_channel::Receiver<Job>) {
        while let Ok(job) = jobs.try_recv() {
            requeue(self.store.as_ref(), &job, &self.metrics).await;
        }
    }
}

/// One in-flight reservation: reserve a job and deliver it to the pool
struct Reservation {
    store: Arc<dyn QueueStore>,
    queues: QueueSet,
    block: Duration,
    jobs: async_channel::Sender<Job>,
    shutdown: ShutdownToken,
    metrics: Arc<DispatchMetrics>,
    _in_flight: InFlight,
}

impl Reservation {
    async fn run(mut self, token: SlotToken) {
        loop {
            let reserved = reserve_job(
                self.store.as_ref(),
                &self.queues,
                token.worker_id(),
                self.block,
                &self.shutdown,
            )
            .await;

            match reserved {
                Ok(Some(job)) => {
                    self.metrics.reserved.fetch_add(1, Ordering::SeqCst);
                    self.deliver(job).await;
                    return;
                }
                Ok(None) => return,
                Err(e) => {
                    warn!(slot = %token, error = %e, "Reservation failed, retrying");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {}
                        _ = self.shutdown.wait() => return,
                    }
                }
            }
        }
    }

    /// Send into the job channel, waiting for room; a job that cannot be
    /// delivered goes back to its queue
    async fn deliver(&mut self, job: Job) {
        if self.shutdown.is_shutdown() {
            requeue(self.store.as_ref(), &job, &self.metrics).await;
            return;
        }

        let delivered = tokio::select! {
            sent = self.jobs.send(job.clone()) => sent.is_ok(),
            _ = self.shutdown.wait() => false,
        };
        if !delivered {
            requeue(self.store.as_ref(), &job, &self.metrics).await;
        }
    }
}

/// Push a reserved job back to its origin queue
async fn requeue(store: &dyn QueueStore, job: &Job, metrics: &DispatchMetrics) {
    let record = match JobRecord::encode(job) {
        Ok(record) => record,
        Err(e) => {
            error!(job = %job.name, queue = %job.queue, error = %e, "Cannot encode job for requeue, job lost");
            return;
        }
    };

    for attempt in 1..=REQUEUE_MAX_ATTEMPTS {
        match store.push(&job.queue, &record).await {
            Ok(()) => {
                metrics.requeued.fetch_add(1, Ordering::SeqCst);
                info!(job = %job.name, queue = %job.queue, "Job re-queued on shutdown");
                return;
            }
            Err(e) => {
                warn!(job = %job.name, queue = %job.queue, attempt, error = %e, "Requeue failed");
                sleep(REQUEUE_RETRY_DELAY).await;
            }
        }
    }
    error!(job = %job.name, queue = %job.queue, payload = %record.as_str(), "Requeue gave up, job lost");
}

/// Keep one worker loop alive: restart on failure, give up after
/// `MAX_WORKER_RESTARTS`
///
/// Each dead worker counted in `dead_workers` costs the pool one slot token.
async fn supervise(worker: Worker, shutdown: ShutdownToken, metrics: Arc<DispatchMetrics>) {
    let mut restarts = 0;
    loop {
        let run = {
            let worker = worker.clone();
            let shutdown = shutdown.clone();
            async move { worker.run(shutdown).await }
        };

        match execute_guarded(run, None).await {
            PanicGuardResult::Success(Ok(())) => return,
            PanicGuardResult::Success(Err(e)) => {
                error!(worker = %worker.id(), error = %e, "Worker loop failed");
            }
            PanicGuardResult::Panicked(msg) => {
                error!(worker = %worker.id(), panic_msg = %msg, "Worker loop panicked");
            }
            PanicGuardResult::TimedOut(_) => {}
        }

        if shutdown.is_shutdown() {
            return;
        }
        if restarts >= MAX_WORKER_RESTARTS {
            metrics.dead_workers.fetch_add(1, Ordering::SeqCst);
            error!(worker = %worker.id(), restarts, "Worker marked dead");
            return;
        }

        restarts += 1;
        metrics.worker_restarts.fetch_add(1, Ordering::SeqCst);
        warn!(worker = %worker.id(), restart = restarts, "Restarting worker");
        sleep(WORKER_RESTART_BACKOFF).await;
    }
}
