//! Decision model: what happens to an item after a failed attempt.
//!
//! Retries are counted, not delayed: a retried item simply stays pending
//! and is picked up by the next processing run.

use super::item::QueueItem;

/// The next action for an item whose attempt just failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Keep the item pending for the next run.
    Retry { reason: String },

    /// Give up. The item becomes `Failed` and is retained.
    MarkFailed { reason: String },
}

/// Decides the next action after a failure.
///
/// Deciders are pure: `item.attempts` already includes the attempt that
/// just failed, and the decider only reads it.
pub trait Decider: Send + Sync {
    fn decide(&self, item: &QueueItem) -> Decision;
}

/// Attempt-count decider:
/// - Retry if attempts < max_attempts
/// - Mark failed if attempts >= max_attempts
#[derive(Debug, Clone, Default)]
pub struct DefaultDecider;

impl Decider for DefaultDecider {
    fn decide(&self, item: &QueueItem) -> Decision {
        if item.is_exhausted() {
            Decision::MarkFailed {
                reason: format!(
                    "Max attempts reached: {}/{}",
                    item.attempts, item.max_attempts
                ),
            }
        } else {
            Decision::Retry {
                reason: format!(
                    "Retry attempt {}/{} on next run",
                    item.attempts + 1,
                    item.max_attempts
                ),
            }
        }
    }
}
