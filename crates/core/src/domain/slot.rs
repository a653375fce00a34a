// Slot Token - one unit of worker capacity

use std::fmt;

/// Capacity credit carrying the identity of the worker that minted it
///
/// Tokens are minted once per worker at pool start and recycled; the tag is
/// only used for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotToken(String);

impl SlotToken {
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self(worker_id.into())
    }

    pub fn worker_id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
