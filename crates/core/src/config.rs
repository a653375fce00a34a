// Typed settings consumed by the dispatcher and the store adapters
// Loading (files, environment) is done by the composition root

use crate::application::dispatcher::DispatcherConfig;
use crate::domain::QueueSet;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResqConfig {
    /// `sqlite://path.db`, `sqlite::memory:`, `redis://host:port/db` or `memory:`
    pub store_url: String,
    pub store_password: Option<String>,

    /// Upper bound of one blocking pop attempt
    pub blpop_max_block_time_secs: u64,
    pub max_workers: usize,

    /// Ordered: earlier queues take priority
    pub queues: Vec<String>,

    /// Idle interval after which the dispatch loop logs
    pub dispatcher_timeout_secs: u64,
    /// Idle interval after which a worker logs
    pub worker_timeout_secs: u64,
    /// Per-job execution limit, unlimited when unset
    pub job_timeout_secs: Option<u64>,
}

impl Default for ResqConfig {
    fn default() -> Self {
        Self {
            store_url: "sqlite://resq.db".to_string(),
            store_password: None,
            blpop_max_block_time_secs: 1,
            max_workers: 4,
            queues: vec!["default".to_string()],
            dispatcher_timeout_secs: 5,
            worker_timeout_secs: 5,
            job_timeout_secs: None,
        }
    }
}

impl ResqConfig {
    /// Reject settings that would prevent startup
    pub fn validate(&self) -> Result<()> {
        if self.store_url.trim().is_empty() {
            return Err(AppError::Config("store_url is empty".to_string()));
        }
        if self.max_workers == 0 {
            return Err(AppError::Config("max_workers must be > 0".to_string()));
        }
        if self.queues.is_empty() {
            return Err(AppError::Config("queues must not be empty".to_string()));
        }
        if self.blpop_max_block_time_secs == 0 {
            return Err(AppError::Config(
                "blpop_max_block_time_secs must be > 0".to_string(),
            ));
        }
        if self.dispatcher_timeout_secs == 0 || self.worker_timeout_secs == 0 {
            return Err(AppError::Config("idle timeouts must be > 0".to_string()));
        }
        if self.job_timeout_secs == Some(0) {
            return Err(AppError::Config("job_timeout_secs must be > 0".to_string()));
        }
        QueueSet::new(self.queues.iter().cloned())
            .map_err(|e| AppError::Config(e.to_string()))?;
        Ok(())
    }

    pub fn queue_set(&self) -> Result<QueueSet> {
        QueueSet::new(self.queues.iter().cloned()).map_err(|e| AppError::Config(e.to_string()))
    }

    pub fn dispatcher_config(&self) -> Result<DispatcherConfig> {
        self.validate()?;
        Ok(DispatcherConfig {
            max_workers: self.max_workers,
            queues: self.queue_set()?,
            blpop_max_block_time: Duration::from_secs(self.blpop_max_block_time_secs),
            dispatcher_timeout: Duration::from_secs(self.dispatcher_timeout_secs),
            worker_timeout: Duration::from_secs(self.worker_timeout_secs),
            job_timeout: self.job_timeout_secs.map(Duration::from_secs),
        })
    }
}
