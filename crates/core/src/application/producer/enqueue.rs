// Enqueue Use Case

use crate::domain::{validate_queue_name, Job, JobArgs, JobRecord};
use crate::error::{AppError, Result};
use crate::port::QueueStore;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const MAX_JOB_NAME_LEN: usize = 128;
const MAX_ARGS_DEPTH: usize = 32;

/// Enqueue request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub name: String,
    pub queue: String,

    #[serde(default)]
    pub args: JobArgs,

    #[serde(default)]
    pub retry: bool,

    #[serde(default)]
    pub retry_every_secs: u64,
}

impl EnqueueRequest {
    pub fn new(name: impl Into<String>, queue: impl Into<String>, args: JobArgs) -> Self {
        Self {
            name: name.into(),
            queue: queue.into(),
            args,
            retry: false,
            retry_every_secs: 0,
        }
    }

    pub fn with_retry(mut self, every_secs: u64) -> Self {
        self.retry = true;
        self.retry_every_secs = every_secs;
        self
    }
}

/// Validate enqueue request before touching the store
pub fn validate_request(req: &EnqueueRequest) -> Result<()> {
    validate_queue_name(&req.queue).map_err(|e| AppError::Validation(e.to_string()))?;

    if req.name.trim().is_empty() {
        return Err(AppError::Validation("Job name is empty".to_string()));
    }
    if req.name.len() > MAX_JOB_NAME_LEN {
        return Err(AppError::Validation(format!(
            "Job name too long (max {})",
            MAX_JOB_NAME_LEN
        )));
    }

    let depth = req.args.values().map(json_depth).max().unwrap_or(0) + 1;
    if depth > MAX_ARGS_DEPTH {
        return Err(AppError::Validation(format!(
            "Args too deeply nested ({} > {})",
            depth, MAX_ARGS_DEPTH
        )));
    }
    Ok(())
}

fn json_depth(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::Object(map) => 1 + map.values().map(json_depth).max().unwrap_or(0),
        serde_json::Value::Array(items) => 1 + items.iter().map(json_depth).max().unwrap_or(0),
        _ => 0,
    }
}

/// Execute enqueue use case
///
/// # Arguments
///
/// * `store` - Queue store receiving the record
/// * `req` - Enqueue request
///
/// The enqueue timestamp comes from the store clock so producers on different
/// hosts agree on it.
pub async fn execute(store: &dyn QueueStore, req: EnqueueRequest) -> Result<Job> {
    validate_request(&req)?;

    let enqueued_at = store.now().await?;
    let mut job = Job::new(req.name, req.queue, req.args, enqueued_at);
    if req.retry {
        job = job.with_retry(Duration::from_secs(req.retry_every_secs));
    }

    let record = JobRecord::encode(&job)?;
    store.push(&job.queue, &record).await?;

    debug!(job = %job.name, queue = %job.queue, "Job enqueued");
    Ok(job)
}
