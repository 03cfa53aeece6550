//! Result of one processing run.

use serde::{Deserialize, Serialize};

/// Counts for a single `process_queue` run.
///
/// `processed == succeeded + failed`. Items with no action attached are not
/// attempted and only show up in `skipped`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ProcessSummary {
    pub fn record_success(&mut self) {
        self.processed += 1;
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self) {
        self.processed += 1;
        self.failed += 1;
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.processed == 0 && self.skipped == 0
    }
}
