//! QueueBuilder - QueueManager の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - trait object による依存の差し替え（テストでは FixedClock / InMemoryStore）

use std::sync::Arc;

use crate::config::QueueConfig;
use crate::domain::{Decider, DefaultDecider, QueueError};
use crate::ports::{
    ActionResolver, AlwaysOnline, Clock, ConnectivitySignal, DurableStore, IdGenerator,
    SystemClock, UlidGenerator,
};
use crate::queue::{Parts, QueueManager};

/// QueueBuilder は QueueManager を構築
///
/// # 使用例
/// ```ignore
/// let queue = QueueBuilder::new(QueueConfig::new("label-sync"))
///     .store(Arc::new(FileStore::new("/var/lib/app/queues")))
///     .connectivity(network_monitor.clone())
///     .resolver(|item: &QueueItem| actions.for_metadata(&item.metadata))
///     .build()
///     .await?;
/// ```
///
/// # Fail-fast 設計
/// - 設定（queue_name, default_max_attempts）は build() 時に検証
/// - DurableStore は必須（未設定なら BuildError::MissingStore）
/// - その他（Clock, IdGenerator, Decider, ConnectivitySignal）はデフォルトあり
pub struct QueueBuilder {
    config: QueueConfig,
    store: Option<Arc<dyn DurableStore>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    decider: Option<Arc<dyn Decider>>,
    connectivity: Option<Arc<dyn ConnectivitySignal>>,
    resolver: Option<Arc<dyn ActionResolver>>,
}

/// BuildError は構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid config: {0}")]
    InvalidConfig(#[from] QueueError),

    #[error("a durable store is required for queue '{0}'")]
    MissingStore(String),
}

impl QueueBuilder {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            store: None,
            clock: None,
            ids: None,
            decider: None,
            connectivity: None,
            resolver: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    /// Online signal consulted by the enqueue-time auto-processing hook.
    pub fn connectivity(mut self, connectivity: Arc<dyn ConnectivitySignal>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Re-supplies actions for items reloaded from the store.
    pub fn resolver(mut self, resolver: impl ActionResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// 設定を検証し、ストアから再読み込みした QueueManager を返す
    pub async fn build(self) -> Result<QueueManager, BuildError> {
        self.config.validate()?;
        let store = self
            .store
            .ok_or_else(|| BuildError::MissingStore(self.config.queue_name.clone()))?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(SystemClock)));

        let parts = Parts {
            config: self.config,
            store,
            clock,
            ids,
            decider: self.decider.unwrap_or_else(|| Arc::new(DefaultDecider)),
            connectivity: self.connectivity.unwrap_or_else(|| Arc::new(AlwaysOnline)),
            resolver: self.resolver,
        };
        Ok(QueueManager::open(parts).await)
    }
}
