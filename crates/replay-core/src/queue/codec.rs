//! Persisted layout of a queue and load-time reconciliation.
//!
//! One JSON document per queue name:
//! `{"version":1,"queue":"<name>","items":[QueueItem, ...]}`
//! Items keep enqueue order. Actions are never persisted.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::{ItemStatus, QueueError, QueueItem};
use crate::ports::IdGenerator;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedQueue {
    version: u32,
    queue: String,
    items: Vec<QueueItem>,
}

#[derive(Serialize)]
struct PersistedQueueRef<'a> {
    version: u32,
    queue: &'a str,
    items: Vec<&'a QueueItem>,
}

pub fn encode<'a>(
    queue: &str,
    items: impl IntoIterator<Item = &'a QueueItem>,
) -> Result<Vec<u8>, QueueError> {
    let doc = PersistedQueueRef {
        version: FORMAT_VERSION,
        queue,
        items: items.into_iter().collect(),
    };
    Ok(serde_json::to_vec(&doc)?)
}

pub fn decode(bytes: &[u8]) -> Result<Vec<QueueItem>, QueueError> {
    let doc: PersistedQueue = serde_json::from_slice(bytes)?;
    if doc.version != FORMAT_VERSION {
        return Err(QueueError::InvariantViolation(format!(
            "unsupported queue format version {} (expected {})",
            doc.version, FORMAT_VERSION
        )));
    }
    Ok(doc.items)
}

/// Result of reconciling a freshly loaded item list.
#[derive(Debug, Default)]
pub struct Reconciled {
    pub items: Vec<QueueItem>,
    /// Items whose status or fields were changed.
    pub changed: usize,
    /// Human-readable invariant violations that were isolated.
    pub violations: Vec<String>,
}

/// Bring a loaded list back to a consistent state:
/// - `Processing` means a crash mid-attempt: back to `Pending`.
/// - `max_attempts == 0`: raised to 1 and isolated as `Failed`.
/// - `attempts > max_attempts`: clamped and isolated as `Failed`.
/// - `Pending` with no attempts left: isolated as `Failed`.
/// - Duplicate id: the later item gets a fresh id and is isolated as `Failed`.
pub fn reconcile(items: Vec<QueueItem>, ids: &dyn IdGenerator) -> Reconciled {
    let mut out = Reconciled::default();
    let mut seen = HashSet::with_capacity(items.len());

    for mut item in items {
        let mut violation: Option<String> = None;

        if !seen.insert(item.id) {
            let old = item.id;
            let mut fresh = ids.generate_item_id();
            while seen.contains(&fresh) {
                fresh = ids.generate_item_id();
            }
            seen.insert(fresh);
            item.id = fresh;
            violation = Some(format!("duplicate id {old}, reassigned to {fresh}"));
        }

        if item.status == ItemStatus::Processing {
            item.status = ItemStatus::Pending;
            out.changed += 1;
        }

        if item.max_attempts == 0 {
            item.max_attempts = 1;
            violation.get_or_insert_with(|| format!("{} has max_attempts == 0", item.id));
        }

        if violation.is_none() {
            if item.attempts > item.max_attempts {
                violation = Some(format!(
                    "{} has attempts {} > max_attempts {}",
                    item.id, item.attempts, item.max_attempts
                ));
            } else if item.status == ItemStatus::Pending && item.is_exhausted() {
                violation = Some(format!(
                    "{} is pending with no attempts left ({}/{})",
                    item.id, item.attempts, item.max_attempts
                ));
            }
        }

        if let Some(v) = violation {
            item.attempts = item.attempts.min(item.max_attempts);
            item.status = ItemStatus::Failed;
            item.last_error = Some(format!("invariant violation: {v}"));
            out.changed += 1;
            out.violations.push(v);
        }

        out.items.push(item);
    }

    out
}
