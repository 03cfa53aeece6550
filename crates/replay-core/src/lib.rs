//! replay-core
//!
//! A persistent, retrying operation queue. Callers enqueue side-effecting
//! actions (remote sync calls and the like); the queue mirrors every change to
//! a durable store and replays pending work across restarts and outages.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, item, decision, events, errors, summary）
//! - **ports**: 抽象化レイヤー（DurableStore, DeferredAction, Clock, IdGenerator, ConnectivitySignal）
//! - **impls**: ports の実装（InMemoryStore, FileStore）
//! - **bus**: ライフサイクルイベントの publish/subscribe
//! - **queue**: QueueManager 本体と永続化フォーマット
//! - **app**: QueueBuilder（構築・再読み込み）
//! - **config**: QueueConfig
//! - observability: QueueCounts
//!
//! # Recoverability
//! Actions are live values and are never persisted. After a restart the
//! reloaded items keep their id, metadata, attempts and status, but they only
//! run again once the caller re-supplies an action, either through an
//! `ActionResolver` on the builder or `QueueManager::reattach`. Until then
//! they are skipped by processing runs and stay pending.

pub mod app;
pub mod bus;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;

pub use app::{BuildError, QueueBuilder};
pub use bus::{EventBus, HandlerError, SubscriptionId};
pub use config::QueueConfig;
pub use domain::{
    ActionError, EventKind, ItemId, ItemStatus, ProcessSummary, QueueError, QueueEvent, QueueItem,
};
pub use observability::QueueCounts;
pub use ports::{DeferredAction, DurableStore, action_fn};
pub use queue::QueueManager;
