//! Lifecycle events published by the queue.

use super::ids::ItemId;
use super::item::QueueItem;

/// Event name, used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ItemAdded,
    ItemProcessed,
    ItemFailed,
    QueueEmpty,
    PersistenceFailed,
}

/// QueueEvent はキューのライフサイクルイベント
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    /// An item was enqueued and persisted (or persistence was attempted).
    ItemAdded(QueueItem),

    /// An item's action succeeded; the item is gone from the queue.
    /// The payload is the item as it stood before the successful attempt
    /// (`Pending`, attempts counting only earlier failures).
    ItemProcessed(QueueItem),

    /// Terminal failure: max attempts reached. Published once per item.
    ItemFailed { item: QueueItem, error: String },

    /// No pending items remain.
    QueueEmpty,

    /// A save to the durable store failed. In-memory state stays authoritative
    /// but is not durable until the next successful save.
    PersistenceFailed { key: String, message: String },
}

impl QueueEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            QueueEvent::ItemAdded(_) => EventKind::ItemAdded,
            QueueEvent::ItemProcessed(_) => EventKind::ItemProcessed,
            QueueEvent::ItemFailed { .. } => EventKind::ItemFailed,
            QueueEvent::QueueEmpty => EventKind::QueueEmpty,
            QueueEvent::PersistenceFailed { .. } => EventKind::PersistenceFailed,
        }
    }

    pub fn item_id(&self) -> Option<ItemId> {
        match self {
            QueueEvent::ItemAdded(item) | QueueEvent::ItemProcessed(item) => Some(item.id),
            QueueEvent::ItemFailed { item, .. } => Some(item.id),
            QueueEvent::QueueEmpty | QueueEvent::PersistenceFailed { .. } => None,
        }
    }
}
