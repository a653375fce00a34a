// Task Handler Port
// The embedding application maps job names to handlers; the core only invokes them

use crate::domain::JobArgs;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Job-level errors. Recorded as failures, never propagated to the dispatcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task failed: {0}")]
    Failed(String),

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Task timed out after {0:?}")]
    Timeout(Duration),

    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Unknown task: {0}")]
    UnknownTask(String),
}

/// A unit of work selected by job name
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Run the task with the job's arguments
    ///
    /// # Errors
    /// Any error marks the job failed (and triggers a retry when the job asks for one)
    async fn perform(&self, args: &JobArgs) -> Result<(), TaskError>;
}

/// Adapter turning an async closure into a TaskHandler
pub struct FnTask<F> {
    f: F,
}

impl<F> FnTask<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> TaskHandler for FnTask<F>
where
    F: Fn(JobArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    async fn perform(&self, args: &JobArgs) -> Result<(), TaskError> {
        (self.f)(args.clone()).await
    }
}

/// Name → handler mapping
#[derive(Clone, Default)]
pub struct TaskRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for `name`
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn TaskHandler>) -> &mut Self {
        let name = name.into();
        if self.handlers.insert(name.clone(), handler).is_some() {
            tracing::warn!(task = %name, "Task handler replaced");
        }
        self
    }

    /// Register an async closure as the handler for `name`
    ///
    /// # Example
    /// ```text
    /// registry.register_fn("send_email", |args| async move {
    ///     let to = args.get("to").and_then(|v| v.as_str()).unwrap_or_default();
    ///     mailer::send(to).await.map_err(|e| TaskError::Failed(e.to_string()))
    /// });
    /// ```
    pub fn register_fn<F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(JobArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.register(name, Arc::new(FnTask::new(f)))
    }

    /// Look up a handler; a miss is recoverable
    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.names())
            .finish()
    }
}
