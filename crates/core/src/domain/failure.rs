// Failure Record - what operators see in the failure list

use super::job::{Job, JobRecord};
use serde::{Deserialize, Serialize};

/// One failed execution, pushed to the failure list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub payload: Job,
    pub error: String,
    pub worker: String,
    pub queue: String,
    pub failed_at: i64, // epoch ms
}

impl FailureRecord {
    pub fn new(job: &Job, error: impl Into<String>, worker: impl Into<String>, failed_at: i64) -> Self {
        Self {
            queue: job.queue.clone(),
            payload: job.clone(),
            error: error.into(),
            worker: worker.into(),
            failed_at,
        }
    }

    pub fn to_record(&self) -> Result<JobRecord, serde_json::Error> {
        serde_json::to_string(self).map(JobRecord::from_raw)
    }
}
