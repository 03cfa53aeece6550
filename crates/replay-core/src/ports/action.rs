//! DeferredAction port - 呼び出し側が渡す「遅延実行アクション」
//!
//! キューはアクションの中身を知りません。成功したか、エラーを返したかだけを見ます。
//!
//! # 永続化の制約
//! アクションは実行可能な値なのでシリアライズできません。
//! 再起動後に読み込まれたアイテムは、呼び出し側が `ActionResolver` か
//! `QueueManager::reattach` でアクションを渡し直すまで実行されません。

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{ActionError, QueueItem};

/// DeferredAction は 1 回の実行試行を表す
///
/// # 使用例
/// ```ignore
/// struct PushLabel { client: Client, label: String }
///
/// #[async_trait]
/// impl DeferredAction for PushLabel {
///     async fn run(&self) -> Result<(), ActionError> {
///         self.client.push(&self.label).await.map_err(|e| ActionError::new(e.to_string()))
///     }
/// }
/// ```
#[async_trait]
pub trait DeferredAction: Send + Sync {
    async fn run(&self) -> Result<(), ActionError>;
}

/// クロージャを DeferredAction として使うためのアダプタ
pub struct FnAction<F> {
    f: F,
}

impl<F> FnAction<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> DeferredAction for FnAction<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
{
    async fn run(&self) -> Result<(), ActionError> {
        (self.f)().await
    }
}

/// Wrap an async closure as a shareable action.
///
/// ```ignore
/// let action = action_fn(|| async { Ok(()) });
/// queue.enqueue("sync-task-1", action, json!({"taskId": 42}), None).await?;
/// ```
pub fn action_fn<F, Fut>(f: F) -> Arc<dyn DeferredAction>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
{
    Arc::new(FnAction::new(f))
}

/// ActionResolver は再読み込みしたアイテムにアクションを割り当てる
///
/// `operation_label` は観測用なので、通常は `metadata` を見て判断します。
/// `None` を返したアイテムはアクション未割り当てのまま残ります。
pub trait ActionResolver: Send + Sync {
    fn resolve(&self, item: &QueueItem) -> Option<Arc<dyn DeferredAction>>;
}

impl<F> ActionResolver for F
where
    F: Fn(&QueueItem) -> Option<Arc<dyn DeferredAction>> + Send + Sync,
{
    fn resolve(&self, item: &QueueItem) -> Option<Arc<dyn DeferredAction>> {
        self(item)
    }
}
