use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use replay_core::domain::{ActionError, QueueEvent, QueueItem};
use replay_core::impls::FileStore;
use replay_core::{DeferredAction, QueueBuilder, QueueConfig};

const DEFAULT_DATA_DIR: &str = ".replay";
const DEFAULT_FILTER: &str = "replay_core=info,replay_cli=info";

/// `fail_first` 回失敗してから成功するデモ用アクション
struct GreetAction {
    name: String,
    remaining_failures: AtomicU32,
}

impl GreetAction {
    fn new(name: impl Into<String>, fail_first: u32) -> Self {
        Self {
            name: name.into(),
            remaining_failures: AtomicU32::new(fail_first),
        }
    }

    /// metadata から作り直す（再起動後の再割り当て用）
    fn from_item(item: &QueueItem) -> Option<Arc<dyn DeferredAction>> {
        let name = item.metadata.get("name")?.as_str()?;
        Some(Arc::new(Self::new(name, fail_first(&item.metadata))))
    }
}

/// `failFirst` を読む。u32 に収まらない値は u32::MAX（= 常に失敗）に丸める
fn fail_first(metadata: &Value) -> u32 {
    metadata
        .get("failFirst")
        .and_then(Value::as_u64)
        .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

#[async_trait]
impl DeferredAction for GreetAction {
    async fn run(&self) -> Result<(), ActionError> {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(ActionError::new(format!(
                "intentional failure (left={left})"
            )));
        }
        println!("Hello, {}!", self.name);
        Ok(())
    }
}

fn init_logging() {
    let log_format = std::env::var("REPLAY_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    match log_format.as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init(),
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_logging();

    // (A) 設定とストア
    let mut config = QueueConfig::from_env()?;
    config.auto_process = false;
    let data_dir = std::env::var("REPLAY_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR));
    info!(data_dir = %data_dir.display(), queue = %config.queue_name, "opening queue");

    // (B) 前回の残りは metadata からアクションを作り直す
    let queue = QueueBuilder::new(config)
        .store(Arc::new(FileStore::new(data_dir)))
        .resolver(GreetAction::from_item)
        .build()
        .await?;
    if queue.durability_degraded() {
        warn!("persisted queue could not be loaded, starting empty");
    }

    queue.subscribe_all(|event| {
        match event {
            QueueEvent::ItemFailed { item, error } => {
                warn!(item_id = %item.id, attempts = item.attempts, error = %error, "gave up")
            }
            other => info!(event = ?other.kind(), item_id = ?other.item_id(), "event"),
        }
        Ok(())
    });

    // (C) 投入: 2 回失敗してから成功するものと、必ず失敗するもの
    let flaky = json!({ "name": "replay", "failFirst": 2 });
    let id = queue
        .enqueue(
            "greet",
            Arc::new(GreetAction::new("replay", 2)),
            flaky,
            None,
        )
        .await?;
    println!("enqueued: {id}");

    let doomed = json!({ "name": "never", "failFirst": u32::MAX });
    queue
        .enqueue(
            "greet",
            Arc::new(GreetAction::new("never", u32::MAX)),
            doomed,
            Some(2),
        )
        .await?;

    // (D) pending がなくなるまで回す
    let mut run = 0;
    while queue.pending_count().await > 0 {
        run += 1;
        let summary = queue.process_queue().await;
        println!("run {run}: {summary:?}");
        if summary.processed == 0 {
            // 残りはアクション未割り当て
            break;
        }
    }

    let counts = queue.counts().await;
    println!("counts: total={} {counts:?}", counts.total());
    for item in queue.failed_items().await {
        println!(
            "failed: id={} attempts={}/{} last_error={:?}",
            item.id, item.attempts, item.max_attempts, item.last_error
        );
    }
    Ok(())
}
