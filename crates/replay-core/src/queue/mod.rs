//! Queue module: the manager, its persisted layout, and single-flight control.

pub mod codec;
mod flight;
mod manager;

pub(crate) use manager::Parts;
pub use manager::QueueManager;
