//! InMemoryStore - テスト・開発用の DurableStore
//!
//! # 障害注入
//! `fail_saves(true)` / `fail_loads(true)` で StoreError を返すように切り替えられます。
//! 永続化失敗時の振る舞い（PersistenceFailed イベント、durability_degraded）のテストに使います。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::ports::{DurableStore, StoreError};

/// InMemoryStore は HashMap<String, Vec<u8>> に保存する
///
/// Clone しても同じ中身を共有します（再起動シミュレーション用）。
#[derive(Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fail_saves: Arc<AtomicBool>,
    fail_loads: Arc<AtomicBool>,
    saves: Arc<AtomicUsize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Raw bytes currently stored under `key`.
    pub async fn snapshot(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.lock().await.get(key).cloned()
    }

    /// Overwrite raw bytes (e.g. to plant corrupt data in tests).
    pub async fn put_raw(&self, key: &str, bytes: Vec<u8>) {
        self.entries.lock().await.insert(key.to_string(), bytes);
    }
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("load refused for {key}")));
        }
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("save refused for {key}")));
        }
        self.entries
            .lock()
            .await
            .insert(key.to_string(), bytes.to_vec());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
