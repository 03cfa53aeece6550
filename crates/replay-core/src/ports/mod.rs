//! Ports - 抽象化レイヤー
//!
//! QueueManager が依存する外部ケイパビリティを trait で定義します。
//! 実装の詳細（ファイル、メモリ、ネットワーク状態の検出など）は隠蔽されます。

pub mod action;
pub mod clock;
pub mod connectivity;
pub mod durable_store;
pub mod id_generator;

pub use self::action::{ActionResolver, DeferredAction, FnAction, action_fn};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::connectivity::{AlwaysOnline, ConnectivitySignal, ManualConnectivity};
pub use self::durable_store::{DurableStore, StoreError};
pub use self::id_generator::{IdGenerator, UlidGenerator};
