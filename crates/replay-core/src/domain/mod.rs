//! Domain model (ids, items, decisions, events, errors).

pub mod decision;
pub mod errors;
pub mod events;
pub mod ids;
pub mod item;
pub mod summary;

pub use decision::{Decider, Decision, DefaultDecider};
pub use errors::{ActionError, ErrorKind, QueueError, Result};
pub use events::{EventKind, QueueEvent};
pub use ids::ItemId;
pub use item::{DEFAULT_MAX_ATTEMPTS, ItemStatus, QueueItem};
pub use summary::ProcessSummary;
