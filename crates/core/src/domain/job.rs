// Job Domain Model

use super::error::{DomainError, Result};
use super::queue::QueueId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Job arguments (JSON object)
pub type JobArgs = serde_json::Map<String, serde_json::Value>;

/// Job Entity
///
/// Created by a producer, consumed once by one worker. Immutable after creation:
/// a retry re-pushes the same value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub queue: QueueId,

    #[serde(default)]
    pub args: JobArgs,

    #[serde(rename = "enqueue_timestamp")]
    pub enqueued_at: i64, // epoch ms

    #[serde(default)]
    pub retry: bool,

    /// Delay before a failed job is re-pushed (whole seconds on the wire).
    /// Only set through `with_retry`, so the value always survives encoding.
    #[serde(default, with = "duration_secs")]
    retry_every: Duration,
}

impl Job {
    /// Create a non-retrying job
    ///
    /// # Arguments
    ///
    /// * `name` - Task name, resolved against the task registry
    /// * `queue` - Origin queue
    /// * `args` - Handler arguments
    /// * `enqueued_at` - Enqueue timestamp in epoch ms (injected, not system time)
    pub fn new(
        name: impl Into<String>,
        queue: impl Into<String>,
        args: JobArgs,
        enqueued_at: i64,
    ) -> Self {
        Self {
            name: name.into(),
            queue: queue.into(),
            args,
            enqueued_at,
            retry: false,
            retry_every: Duration::ZERO,
        }
    }

    /// Enable retry-on-failure, re-pushing after `every`
    ///
    /// Sub-second precision is dropped so the value survives the record format.
    pub fn with_retry(mut self, every: Duration) -> Self {
        self.retry = true;
        self.retry_every = Duration::from_secs(every.as_secs());
        self
    }

    /// Delay before a failed job is re-pushed
    pub fn retry_every(&self) -> Duration {
        self.retry_every
    }
}

/// Raw item stored in a queue list (a JSON document)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord(String);

impl JobRecord {
    /// Encode a job into its store representation
    pub fn encode(job: &Job) -> std::result::Result<Self, serde_json::Error> {
        serde_json::to_string(job).map(Self)
    }

    /// Wrap a raw payload read back from a store
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Decode into a Job
    pub fn decode(&self) -> Result<Job> {
        serde_json::from_str(&self.0).map_err(|e| DomainError::MalformedRecord(e.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
