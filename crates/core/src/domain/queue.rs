// Queue Domain Model

use super::error::{DomainError, Result};
use std::fmt;
use std::sync::Arc;

/// Queue identifier
pub type QueueId = String;

/// Internal list that collects failure records
pub const FAILED_QUEUE: &str = "__failed__";

/// Prefix reserved for internal lists
const RESERVED_PREFIX: &str = "__";

const MAX_QUEUE_NAME_LEN: usize = 64;

/// Check a producer-facing queue name
pub fn validate_queue_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| DomainError::InvalidQueueName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("queue name is empty"));
    }
    if name.len() > MAX_QUEUE_NAME_LEN {
        return Err(invalid("queue name too long (max 64)"));
    }
    if name.starts_with(RESERVED_PREFIX) {
        return Err(invalid("prefix '__' is reserved"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
    {
        return Err(invalid("only alphanumeric and _ - . : allowed"));
    }
    Ok(())
}

/// Ordered set of queue names polled by a reservation
///
/// Order is priority: the first queue with an item wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSet {
    names: Arc<[QueueId]>,
}

impl QueueSet {
    /// Build from configuration order, dropping duplicates (first occurrence wins)
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ordered: Vec<QueueId> = Vec::new();
        for name in names {
            let name = name.into();
            validate_queue_name(&name)?;
            if !ordered.contains(&name) {
                ordered.push(name);
            }
        }
        Ok(Self {
            names: ordered.into(),
        })
    }

    pub fn names(&self) -> &[QueueId] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueId> {
        self.names.iter()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

impl fmt::Display for QueueSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names.join(","))
    }
}
