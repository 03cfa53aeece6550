//! DurableStore port - キューの永続化先（key-value）
//!
//! QueueManager はキュー名ごとに 1 つの key へ、シリアライズ済みの
//! アイテム一覧を丸ごと保存します。
//!
//! # 実装
//! - **InMemoryStore**: テスト用（障害注入あり）
//! - **FileStore**: key ごとに 1 ファイル（temp + rename による all-or-nothing 書き込み）

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// DurableStore は bytes を key 単位で保存
///
/// # 契約
/// - `load` は保存されていなければ `Ok(None)`
/// - `save` は all-or-nothing: 途中でクラッシュしても、前の値か新しい値のどちらかが残る
/// - 同じ key への reader/writer は 1 つだけを想定
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;
}
