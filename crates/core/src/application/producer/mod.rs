// Producer - enqueue jobs for the worker pool

pub mod enqueue;


pub use enqueue::{validate_request, EnqueueRequest};

use crate::domain::Job;
use crate::error::Result;
use crate::port::QueueStore;
use std::sync::Arc;

/// Producer handle over a queue store
#[derive(Clone)]
pub struct Producer {
    store: Arc<dyn QueueStore>,
}

impl Producer {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// Enqueue a new job, returning it as stored
    pub async fn enqueue(&self, req: EnqueueRequest) -> Result<Job> {
        enqueue::execute(self.store.as_ref(), req).await
    }

    /// Current backlog of a queue
    pub async fn size(&self, queue: &str) -> Result<i64> {
        self.store.size(queue).await
    }
}
