//! ConnectivitySignal port - オンライン状態の通知（外部コラボレータ）
//!
//! enqueue 直後の自動実行をするかどうかの判定にだけ使います。
//! 手動の `process_queue()` はこのシグナルに関係なく実行されます。

use std::sync::atomic::{AtomicBool, Ordering};

pub trait ConnectivitySignal: Send + Sync {
    fn is_online(&self) -> bool;
}

/// 常にオンライン（デフォルト）
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl ConnectivitySignal for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// 外部から切り替えられるシグナル
#[derive(Debug)]
pub struct ManualConnectivity {
    online: AtomicBool,
}

impl ManualConnectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl ConnectivitySignal for ManualConnectivity {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
