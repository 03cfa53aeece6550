use serde::{Deserialize, Serialize};

/// Item counts by status. `detached` counts items (any status) that have no
/// action attached, typically after a reload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub processing: usize,
    pub failed: usize,
    pub detached: usize,
}

impl QueueCounts {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.failed
    }
}
