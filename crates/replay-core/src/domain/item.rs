//! Queue item record and its status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::ItemId;

/// Default ceiling on execution attempts per item.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Item status.
///
/// State transitions:
/// - Pending -> Processing -> [removed]        (action succeeded)
/// - Pending -> Processing -> Pending          (failed, attempts < max_attempts)
/// - Pending -> Processing -> Failed           (failed, attempts == max_attempts)
///
/// `Processing` only marks an in-flight attempt for crash diagnostics.
/// A reloaded `Processing` item is treated as `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Waiting for the next processing run.
    Pending,

    /// Action currently in flight.
    Processing,

    /// Gave up after max_attempts failures. Retained until cleared.
    Failed,
}

impl ItemStatus {
    /// Is this a terminal state (no further transitions without caller intervention)?
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Failed)
    }

    /// Is this item eligible for a processing run?
    pub fn is_runnable(self) -> bool {
        matches!(self, ItemStatus::Pending)
    }
}

/// One unit of deferred work, as persisted and as reported in events.
///
/// The action itself is not part of this record: it is a live value that
/// cannot be serialized. See `QueueManager::reattach`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: ItemId,

    /// Human-readable description, for observability only.
    pub operation_label: String,

    /// Caller-opaque payload, returned unchanged.
    #[serde(default)]
    pub metadata: serde_json::Value,

    /// Number of failed execution attempts so far.
    pub attempts: u32,

    pub max_attempts: u32,

    pub status: ItemStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn new(
        id: ItemId,
        operation_label: impl Into<String>,
        metadata: serde_json::Value,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            operation_label: operation_label.into(),
            metadata,
            attempts: 0,
            max_attempts,
            status: ItemStatus::Pending,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark as in flight.
    pub fn mark_processing(&mut self, now: DateTime<Utc>) {
        self.status = ItemStatus::Processing;
        self.updated_at = now;
    }

    /// Count a failed attempt and keep its error.
    pub fn record_failure(&mut self, error: String, now: DateTime<Utc>) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_error = Some(error);
        self.updated_at = now;
    }

    /// Back to pending, eligible for the next run. Attempts are kept.
    pub fn requeue(&mut self, now: DateTime<Utc>) {
        self.status = ItemStatus::Pending;
        self.updated_at = now;
    }

    /// Terminal failure.
    pub fn mark_failed(&mut self, now: DateTime<Utc>) {
        self.status = ItemStatus::Failed;
        self.updated_at = now;
    }

    /// Caller-requested reset of a failed item: fresh attempt budget,
    /// last error kept for inspection.
    pub fn reset_attempts(&mut self, now: DateTime<Utc>) {
        self.attempts = 0;
        self.status = ItemStatus::Pending;
        self.updated_at = now;
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}
