//! QueueManager: the persistent, retrying operation queue.
//!
//! Design:
//! - The item list lives behind one async mutex and is the single source of truth.
//! - Every mutation is mirrored to the DurableStore while the lock is held, so
//!   saves never race each other.
//! - Actions run outside the lock, one at a time.
//! - Events are published after the lock is released.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use super::codec;
use super::flight::InFlight;
use crate::bus::{EventBus, HandlerError, SubscriptionId, panic_message};
use crate::config::QueueConfig;
use crate::domain::{
    Decider, Decision, ErrorKind, EventKind, ItemId, ItemStatus, ProcessSummary, QueueError, QueueEvent,
    QueueItem, Result,
};
use crate::observability::QueueCounts;
use crate::ports::{
    ActionResolver, Clock, ConnectivitySignal, DeferredAction, DurableStore, IdGenerator,
};

/// An item plus its live action. The action is `None` for items reloaded
/// from the store that nobody has re-supplied an action for yet.
struct Entry {
    item: QueueItem,
    action: Option<Arc<dyn DeferredAction>>,
}

#[derive(Default)]
struct QueueState {
    /// Enqueue order. Retries never move an item.
    entries: Vec<Entry>,
}

impl QueueState {
    fn find(&self, id: ItemId) -> Option<&Entry> {
        self.entries.iter().find(|e| e.item.id == id)
    }

    fn find_mut(&mut self, id: ItemId) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.item.id == id)
    }

    fn remove(&mut self, id: ItemId) -> Option<Entry> {
        let pos = self.entries.iter().position(|e| e.item.id == id)?;
        Some(self.entries.remove(pos))
    }

    fn contains(&self, id: ItemId) -> bool {
        self.find(id).is_some()
    }

    fn pending_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.item.status.is_runnable())
            .count()
    }
}

/// Everything the manager needs, assembled by `QueueBuilder`.
pub(crate) struct Parts {
    pub config: QueueConfig,
    pub store: Arc<dyn DurableStore>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub decider: Arc<dyn Decider>,
    pub connectivity: Arc<dyn ConnectivitySignal>,
    pub resolver: Option<Arc<dyn ActionResolver>>,
}

struct Inner {
    config: QueueConfig,
    key: String,
    state: Mutex<QueueState>,
    store: Arc<dyn DurableStore>,
    bus: EventBus,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    decider: Arc<dyn Decider>,
    connectivity: Arc<dyn ConnectivitySignal>,
    in_flight: InFlight,
    degraded: AtomicBool,
}

/// Handle to one named queue. Cheap to clone; clones share the same queue.
#[derive(Clone)]
pub struct QueueManager {
    inner: Arc<Inner>,
}

impl QueueManager {
    /// Build the manager and reload unfinished work from the store.
    ///
    /// A store or decode failure is not fatal: the queue starts empty and
    /// `durability_degraded()` reports true until the next successful save.
    pub(crate) async fn open(parts: Parts) -> Self {
        let key = parts.config.storage_key();
        let inner = Inner {
            key,
            state: Mutex::new(QueueState::default()),
            store: parts.store,
            bus: EventBus::new(),
            clock: parts.clock,
            ids: parts.ids,
            decider: parts.decider,
            connectivity: parts.connectivity,
            in_flight: InFlight::default(),
            degraded: AtomicBool::new(false),
            config: parts.config,
        };
        let manager = Self {
            inner: Arc::new(inner),
        };
        manager.reload(parts.resolver.as_deref()).await;
        manager
    }

    async fn reload(&self, resolver: Option<&dyn ActionResolver>) {
        let inner = &self.inner;
        let bytes = match inner.store.load(&inner.key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(queue = %inner.config.queue_name, key = %inner.key, "no persisted queue, starting empty");
                return;
            }
            Err(e) => {
                error!(queue = %inner.config.queue_name, key = %inner.key, error_kind = ?ErrorKind::Persistence, error = %e, "failed to load queue, starting empty");
                inner.degraded.store(true, Ordering::SeqCst);
                return;
            }
        };

        let loaded = match codec::decode(&bytes) {
            Ok(items) => items,
            Err(e) => {
                error!(queue = %inner.config.queue_name, key = %inner.key, error_kind = ?e.kind(), error = %e, "persisted queue is unreadable, starting empty");
                inner.degraded.store(true, Ordering::SeqCst);
                // Keep the unreadable bytes aside so the next save does not destroy them.
                let backup = format!("{}.corrupt", inner.key);
                if let Err(e) = inner.store.save(&backup, &bytes).await {
                    error!(key = %backup, error = %e, "failed to back up unreadable queue");
                }
                return;
            }
        };

        let reconciled = codec::reconcile(loaded, inner.ids.as_ref());
        for violation in &reconciled.violations {
            error!(queue = %inner.config.queue_name, error_kind = ?ErrorKind::Invariant, violation = %violation, "invariant violation on reload, item isolated as failed");
        }

        let mut state = inner.state.lock().await;
        let mut detached = 0usize;
        for item in reconciled.items {
            let action = resolver.and_then(|r| r.resolve(&item));
            if action.is_none() {
                detached += 1;
            }
            state.entries.push(Entry { item, action });
        }

        info!(
            queue = %inner.config.queue_name,
            items = state.entries.len(),
            pending = state.pending_count(),
            detached,
            "queue reloaded"
        );

        if reconciled.changed > 0 {
            // Failure is already logged and flagged; nobody is subscribed yet.
            let _ = self.persist(&state).await;
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.config.queue_name
    }

    pub fn storage_key(&self) -> &str {
        &self.inner.key
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// True when the most recent save (or the initial load) failed.
    pub fn durability_degraded(&self) -> bool {
        self.inner.degraded.load(Ordering::SeqCst)
    }

    /// True while a processing run is active.
    pub fn is_processing(&self) -> bool {
        self.inner.in_flight.is_active()
    }

    // ------------------------------------------------------------------
    // events
    // ------------------------------------------------------------------

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&QueueEvent) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(kind, handler)
    }

    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&QueueEvent) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.inner.bus.subscribe_all(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.bus.unsubscribe(id)
    }

    fn publish_all(&self, events: Vec<QueueEvent>) {
        for event in &events {
            self.inner.bus.publish(event);
        }
    }

    // ------------------------------------------------------------------
    // mutations
    // ------------------------------------------------------------------

    /// Add an operation to the queue and return its id without waiting for it to run.
    ///
    /// `max_attempts` defaults to the configured ceiling and must be >= 1.
    /// When auto-processing is enabled, the connectivity signal says online
    /// and no run is active, a run is spawned in the background.
    pub async fn enqueue(
        &self,
        operation_label: impl Into<String>,
        action: Arc<dyn DeferredAction>,
        metadata: serde_json::Value,
        max_attempts: Option<u32>,
    ) -> Result<ItemId> {
        let max_attempts = max_attempts.unwrap_or(self.inner.config.default_max_attempts);
        if max_attempts == 0 {
            return Err(QueueError::InvalidArgument(
                "max_attempts must be >= 1".to_string(),
            ));
        }

        let mut events = Vec::new();
        let item = {
            let mut state = self.lock().await;
            let id = self.fresh_id(&state);
            let item = QueueItem::new(
                id,
                operation_label,
                metadata,
                max_attempts,
                self.inner.clock.now(),
            );
            state.entries.push(Entry {
                item: item.clone(),
                action: Some(action),
            });
            events.extend(self.persist(&state).await);
            item
        };

        debug!(queue = %self.name(), item_id = %item.id, label = %item.operation_label, max_attempts, "item enqueued");
        let id = item.id;
        events.push(QueueEvent::ItemAdded(item));
        self.publish_all(events);

        self.maybe_schedule();
        Ok(id)
    }

    /// Run every item that is pending right now, in enqueue order.
    ///
    /// Returns zero counts immediately if another run is active. Items
    /// enqueued during the run wait for the next run. One item's failure
    /// never stops the run.
    ///
    /// The run itself lives on its own task. Dropping the returned future
    /// (timeout, `select!`, abort) only stops waiting for the summary; the
    /// run keeps the single-flight flag until its last action has settled.
    pub async fn process_queue(&self) -> ProcessSummary {
        let manager = self.clone();
        match tokio::spawn(async move { manager.run_exclusive().await }).await {
            Ok(summary) => summary,
            Err(join_err) => {
                error!(queue = %self.name(), error = %join_err, "processing run aborted");
                ProcessSummary::default()
            }
        }
    }

    async fn run_exclusive(&self) -> ProcessSummary {
        let Some(_guard) = self.inner.in_flight.try_acquire() else {
            debug!(queue = %self.name(), "processing run already active, skipping");
            return ProcessSummary::default();
        };

        let (snapshot, events) = {
            let mut state = self.lock().await;
            let now = self.inner.clock.now();
            // No run is active, so anything still marked processing is stale.
            let mut requeued = 0usize;
            for entry in state.entries.iter_mut() {
                if entry.item.status == ItemStatus::Processing {
                    entry.item.requeue(now);
                    requeued += 1;
                }
            }
            let mut events = Vec::new();
            if requeued > 0 {
                warn!(queue = %self.name(), requeued, "stale processing items returned to pending");
                events.extend(self.persist(&state).await);
            }
            let snapshot: Vec<ItemId> = state
                .entries
                .iter()
                .filter(|e| e.item.status.is_runnable())
                .map(|e| e.item.id)
                .collect();
            (snapshot, events)
        };
        self.publish_all(events);

        let mut summary = ProcessSummary::default();
        for id in snapshot {
            self.process_one(id, &mut summary).await;
        }

        let pending_left = self.lock().await.pending_count();
        if pending_left == 0 {
            self.inner.bus.publish(&QueueEvent::QueueEmpty);
        }

        if !summary.is_empty() {
            info!(
                queue = %self.name(),
                processed = summary.processed,
                succeeded = summary.succeeded,
                failed = summary.failed,
                skipped = summary.skipped,
                pending_left,
                "processing run finished"
            );
        }
        summary
    }

    async fn process_one(&self, id: ItemId, summary: &mut ProcessSummary) {
        let mut events = Vec::new();

        let started = {
            let mut state = self.lock().await;
            let now = self.inner.clock.now();
            let Some(entry) = state.find_mut(id) else {
                debug!(item_id = %id, "item removed before its turn");
                return;
            };
            if !entry.item.status.is_runnable() {
                return;
            }
            let Some(action) = entry.action.clone() else {
                warn!(queue = %self.name(), item_id = %id, "no action attached, skipping");
                summary.record_skip();
                return;
            };
            if entry.item.is_exhausted() {
                let violation = format!(
                    "{} is pending with no attempts left ({}/{})",
                    id, entry.item.attempts, entry.item.max_attempts
                );
                error!(queue = %self.name(), error_kind = ?ErrorKind::Invariant, violation = %violation, "invariant violation, item isolated as failed");
                entry.item.attempts = entry.item.attempts.min(entry.item.max_attempts);
                entry.item.last_error = Some(format!("invariant violation: {violation}"));
                entry.item.mark_failed(now);
                let item = entry.item.clone();
                events.extend(self.persist(&state).await);
                events.push(QueueEvent::ItemFailed {
                    item,
                    error: violation,
                });
                None
            } else {
                entry.item.mark_processing(now);
                let item = entry.item.clone();
                events.extend(self.persist(&state).await);
                Some((item, action))
            }
        };
        self.publish_all(std::mem::take(&mut events));

        let Some((mut item, action)) = started else {
            return;
        };

        debug!(queue = %self.name(), item_id = %id, attempt = item.attempts + 1, max_attempts = item.max_attempts, "running action");
        let outcome = run_action(action).await;

        {
            let mut state = self.lock().await;
            let now = self.inner.clock.now();
            match outcome {
                Ok(()) => {
                    summary.record_success();
                    if state.remove(id).is_some() {
                        events.extend(self.persist(&state).await);
                    } else {
                        debug!(item_id = %id, "item cleared while its action was running");
                    }
                    debug!(queue = %self.name(), item_id = %id, "action succeeded, item removed");
                    // the item no longer exists; report it as it stood before the attempt
                    item.requeue(now);
                    events.push(QueueEvent::ItemProcessed(item));
                }
                Err(message) => {
                    summary.record_failure();
                    match state.find_mut(id) {
                        Some(entry) => {
                            entry.item.record_failure(message.clone(), now);
                            match self.inner.decider.decide(&entry.item) {
                                Decision::Retry { reason } => {
                                    entry.item.requeue(now);
                                    warn!(queue = %self.name(), item_id = %id, attempts = entry.item.attempts, max_attempts = entry.item.max_attempts, error = %message, reason = %reason, error_kind = ?ErrorKind::Executor, "action failed, will retry");
                                }
                                Decision::MarkFailed { reason } => {
                                    entry.item.mark_failed(now);
                                    warn!(queue = %self.name(), item_id = %id, attempts = entry.item.attempts, max_attempts = entry.item.max_attempts, error = %message, reason = %reason, error_kind = ?ErrorKind::Executor, "action failed permanently");
                                    events.push(QueueEvent::ItemFailed {
                                        item: entry.item.clone(),
                                        error: message,
                                    });
                                }
                            }
                            // persist failure event goes before ItemFailed
                            let persisted = self.persist(&state).await;
                            for (i, e) in persisted.into_iter().enumerate() {
                                events.insert(i, e);
                            }
                        }
                        None => {
                            debug!(item_id = %id, error = %message, "item cleared while its action was running");
                        }
                    }
                }
            }
        }
        self.publish_all(events);
    }

    /// Remove every item (pending, processing or failed). Does not interrupt
    /// an action that is already running.
    pub async fn clear_all(&self) -> usize {
        let mut events = Vec::new();
        let removed = {
            let mut state = self.lock().await;
            let removed = state.entries.len();
            state.entries.clear();
            events.extend(self.persist(&state).await);
            removed
        };
        info!(queue = %self.name(), removed, "queue cleared");
        events.push(QueueEvent::QueueEmpty);
        self.publish_all(events);
        removed
    }

    /// Remove one item, whatever its status.
    pub async fn remove(&self, id: ItemId) -> Result<QueueItem> {
        let mut events = Vec::new();
        let item = {
            let mut state = self.lock().await;
            let entry = state.remove(id).ok_or(QueueError::NotFound(id))?;
            events.extend(self.persist(&state).await);
            entry.item
        };
        debug!(queue = %self.name(), item_id = %id, "item removed");
        self.publish_all(events);
        Ok(item)
    }

    /// Give a failed item a fresh attempt budget.
    pub async fn retry_failed(&self, id: ItemId) -> Result<()> {
        let mut events = Vec::new();
        {
            let mut state = self.lock().await;
            let now = self.inner.clock.now();
            let entry = state.find_mut(id).ok_or(QueueError::NotFound(id))?;
            if !entry.item.status.is_terminal() {
                return Err(QueueError::InvalidArgument(format!(
                    "{id} is {:?}, only failed items can be retried",
                    entry.item.status
                )));
            }
            entry.item.reset_attempts(now);
            events.extend(self.persist(&state).await);
        }
        info!(queue = %self.name(), item_id = %id, "failed item reset for retry");
        self.publish_all(events);
        self.maybe_schedule();
        Ok(())
    }

    /// Reset every failed item. Returns how many were reset.
    pub async fn retry_all_failed(&self) -> usize {
        let mut events = Vec::new();
        let reset = {
            let mut state = self.lock().await;
            let now = self.inner.clock.now();
            let mut reset = 0;
            for entry in state.entries.iter_mut() {
                if entry.item.status == ItemStatus::Failed {
                    entry.item.reset_attempts(now);
                    reset += 1;
                }
            }
            if reset > 0 {
                events.extend(self.persist(&state).await);
            }
            reset
        };
        if reset > 0 {
            info!(queue = %self.name(), reset, "failed items reset for retry");
            self.publish_all(events);
            self.maybe_schedule();
        }
        reset
    }

    /// Re-supply the action of an item reloaded from the store.
    pub async fn reattach(&self, id: ItemId, action: Arc<dyn DeferredAction>) -> Result<()> {
        {
            let mut state = self.lock().await;
            let entry = state.find_mut(id).ok_or(QueueError::NotFound(id))?;
            entry.action = Some(action);
        }
        debug!(queue = %self.name(), item_id = %id, "action reattached");
        self.maybe_schedule();
        Ok(())
    }

    // ------------------------------------------------------------------
    // queries
    // ------------------------------------------------------------------

    /// Number of items with status `Pending`.
    pub async fn pending_count(&self) -> usize {
        self.lock().await.pending_count()
    }

    pub async fn len(&self) -> usize {
        self.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.lock().await.entries.is_empty()
    }

    pub async fn get(&self, id: ItemId) -> Option<QueueItem> {
        self.lock().await.find(id).map(|e| e.item.clone())
    }

    /// All items in enqueue order.
    pub async fn items(&self) -> Vec<QueueItem> {
        self.lock()
            .await
            .entries
            .iter()
            .map(|e| e.item.clone())
            .collect()
    }

    pub async fn failed_items(&self) -> Vec<QueueItem> {
        self.lock()
            .await
            .entries
            .iter()
            .filter(|e| e.item.status == ItemStatus::Failed)
            .map(|e| e.item.clone())
            .collect()
    }

    /// Ids of items that have no action attached.
    pub async fn detached_ids(&self) -> Vec<ItemId> {
        self.lock()
            .await
            .entries
            .iter()
            .filter(|e| e.action.is_none())
            .map(|e| e.item.id)
            .collect()
    }

    pub async fn counts(&self) -> QueueCounts {
        let state = self.lock().await;
        let mut counts = QueueCounts::default();
        for entry in &state.entries {
            match entry.item.status {
                ItemStatus::Pending => counts.pending += 1,
                ItemStatus::Processing => counts.processing += 1,
                ItemStatus::Failed => counts.failed += 1,
            }
            if entry.action.is_none() {
                counts.detached += 1;
            }
        }
        counts
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    async fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner.state.lock().await
    }

    fn fresh_id(&self, state: &QueueState) -> ItemId {
        let mut id = self.inner.ids.generate_item_id();
        while state.contains(id) {
            id = self.inner.ids.generate_item_id();
        }
        id
    }

    /// Mirror the whole list to the store. On failure the in-memory state stays
    /// authoritative; the returned event must be published once the lock is released.
    async fn persist(&self, state: &QueueState) -> Option<QueueEvent> {
        let inner = &self.inner;
        let result = match codec::encode(
            &inner.config.queue_name,
            state.entries.iter().map(|e| &e.item),
        ) {
            Ok(bytes) => inner
                .store
                .save(&inner.key, &bytes)
                .await
                .map_err(|e| QueueError::persistence(inner.key.as_str(), e)),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                if inner.degraded.swap(false, Ordering::SeqCst) {
                    info!(queue = %inner.config.queue_name, key = %inner.key, "queue persisted again, durability restored");
                }
                None
            }
            Err(e) => {
                inner.degraded.store(true, Ordering::SeqCst);
                warn!(queue = %inner.config.queue_name, key = %inner.key, error_kind = ?e.kind(), error = %e, "failed to persist queue, in-memory state is not durable");
                Some(QueueEvent::PersistenceFailed {
                    key: inner.key.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Enqueue-time policy hook: spawn a background run when allowed.
    fn maybe_schedule(&self) {
        let inner = &self.inner;
        if !inner.config.auto_process {
            return;
        }
        if !inner.connectivity.is_online() {
            debug!(queue = %inner.config.queue_name, "offline, not scheduling a run");
            return;
        }
        if inner.in_flight.is_active() {
            return;
        }

        let manager = self.clone();
        let delay = Duration::from_millis(inner.config.schedule_delay_ms);
        tokio::spawn(async move {
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
            manager.run_exclusive().await;
        });
    }
}

/// Run one attempt on its own task so a panicking action is reported as a
/// failed attempt instead of tearing down the run.
async fn run_action(action: Arc<dyn DeferredAction>) -> std::result::Result<(), String> {
    match tokio::spawn(async move { action.run().await }).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(join_err) if join_err.is_panic() => {
            let panic_msg = panic_message(join_err.into_panic().as_ref());
            error!(panic_msg = %panic_msg, "action panicked");
            Err(format!("action panicked: {panic_msg}"))
        }
        Err(join_err) => Err(format!("action cancelled: {join_err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::QueueBuilder;
    use crate::domain::ActionError;
    use crate::impls::InMemoryStore;
    use crate::ports::{ManualConnectivity, action_fn};
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicU32;
    use tokio::sync::Notify;

    const KEY: &str = "replay.queue.sync";

    fn manual_config() -> QueueConfig {
        let mut config = QueueConfig::new("sync");
        config.auto_process = false;
        config
    }

    async fn open(store: &InMemoryStore) -> QueueManager {
        QueueBuilder::new(manual_config())
            .store(Arc::new(store.clone()))
            .build()
            .await
            .unwrap()
    }

    fn ok_action() -> Arc<dyn DeferredAction> {
        action_fn(|| async { Ok(()) })
    }

    fn failing_action(message: &'static str) -> Arc<dyn DeferredAction> {
        action_fn(move || async move { Err(ActionError::new(message)) })
    }

    fn counting_action(calls: &Arc<AtomicU32>, fail: bool) -> Arc<dyn DeferredAction> {
        let calls = Arc::clone(calls);
        action_fn(move || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if fail {
                    Err(ActionError::new("remote rejected"))
                } else {
                    Ok(())
                }
            }
        })
    }

    fn recording_action(
        log: &Arc<StdMutex<Vec<&'static str>>>,
        tag: &'static str,
        fail: bool,
    ) -> Arc<dyn DeferredAction> {
        let log = Arc::clone(log);
        action_fn(move || {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(tag);
                if fail {
                    Err(ActionError::new(format!("{tag} failed")))
                } else {
                    Ok(())
                }
            }
        })
    }

    /// Blocks until `release` is notified; signals `started` when entered.
    fn gated_action(
        started: &Arc<Notify>,
        release: &Arc<Notify>,
        calls: &Arc<AtomicU32>,
        fail: bool,
    ) -> Arc<dyn DeferredAction> {
        let (started, release, calls) = (Arc::clone(started), Arc::clone(release), Arc::clone(calls));
        action_fn(move || {
            let (started, release, calls) = (Arc::clone(&started), Arc::clone(&release), Arc::clone(&calls));
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                started.notify_one();
                release.notified().await;
                if fail {
                    Err(ActionError::new("gate failed"))
                } else {
                    Ok(())
                }
            }
        })
    }

    fn record_events(queue: &QueueManager) -> Arc<StdMutex<Vec<QueueEvent>>> {
        let events = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        queue.subscribe_all(move |event| {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        });
        events
    }

    fn count_kind(events: &Arc<StdMutex<Vec<QueueEvent>>>, kind: EventKind) -> usize {
        events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind() == kind)
            .count()
    }

    fn summary(processed: usize, succeeded: usize, failed: usize) -> ProcessSummary {
        ProcessSummary {
            processed,
            succeeded,
            failed,
            skipped: 0,
        }
    }

    async fn persisted(store: &InMemoryStore) -> Vec<QueueItem> {
        codec::decode(&store.snapshot(KEY).await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn successful_item_is_processed_and_removed() {
        let store = InMemoryStore::new();
        let queue = open(&store).await;
        let events = record_events(&queue);

        let id = queue
            .enqueue(
                "sync-task-1",
                ok_action(),
                serde_json::json!({"taskId": 42}),
                Some(3),
            )
            .await
            .unwrap();
        assert_eq!(queue.pending_count().await, 1);

        let result = queue.process_queue().await;

        assert_eq!(result, summary(1, 1, 0));
        assert_eq!(queue.pending_count().await, 0);
        assert!(queue.get(id).await.is_none());
        let processed: Vec<ItemId> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                QueueEvent::ItemProcessed(item) => Some(item.id),
                _ => None,
            })
            .collect();
        assert_eq!(processed, vec![id]);
        assert!(persisted(&store).await.is_empty());
    }

    #[tokio::test]
    async fn failing_item_retries_then_fails_at_max_attempts() {
        let store = InMemoryStore::new();
        let queue = open(&store).await;
        let events = record_events(&queue);

        let id = queue
            .enqueue("sync-task-2", failing_action("HTTP 503"), serde_json::json!({}), Some(2))
            .await
            .unwrap();

        assert_eq!(queue.process_queue().await, summary(1, 0, 1));
        let item = queue.get(id).await.unwrap();
        assert_eq!(item.attempts, 1);
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.last_error.as_deref(), Some("HTTP 503"));
        assert_eq!(count_kind(&events, EventKind::ItemFailed), 0);

        assert_eq!(queue.process_queue().await, summary(1, 0, 1));
        let item = queue.get(id).await.unwrap();
        assert_eq!(item.attempts, 2);
        assert_eq!(item.status, ItemStatus::Failed);
        assert_eq!(count_kind(&events, EventKind::ItemFailed), 1);

        let persisted = persisted(&store).await;
        assert_eq!(persisted[0].status, ItemStatus::Failed);
        assert_eq!(persisted[0].attempts, 2);
    }

    #[tokio::test]
    async fn always_failing_item_publishes_item_failed_once() {
        let store = InMemoryStore::new();
        let queue = open(&store).await;
        let events = record_events(&queue);
        let calls = Arc::new(AtomicU32::new(0));

        let id = queue
            .enqueue("push", counting_action(&calls, true), serde_json::json!({}), None)
            .await
            .unwrap();

        for run in 1..=3 {
            assert_eq!(queue.process_queue().await, summary(1, 0, 1));
            let expected = if run < 3 { 0 } else { 1 };
            assert_eq!(count_kind(&events, EventKind::ItemFailed), expected, "run {run}");
        }

        let item = queue.get(id).await.unwrap();
        assert_eq!(item.attempts, 3);
        assert_eq!(item.status, ItemStatus::Failed);

        // failed items are retained and never attempted again
        assert_eq!(queue.process_queue().await, ProcessSummary::default());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(queue.failed_items().await.len(), 1);
        assert_eq!(count_kind(&events, EventKind::ItemFailed), 1);
    }

    #[tokio::test]
    async fn all_successful_items_drain_in_one_run() {
        let store = InMemoryStore::new();
        let queue = open(&store).await;

        for i in 0..5 {
            queue
                .enqueue(format!("op-{i}"), ok_action(), serde_json::json!({"i": i}), None)
                .await
                .unwrap();
        }

        assert_eq!(queue.process_queue().await, summary(5, 5, 0));
        assert_eq!(queue.pending_count().await, 0);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn empty_run_returns_zero_and_publishes_queue_empty() {
        let queue = open(&InMemoryStore::new()).await;
        let events = record_events(&queue);

        assert_eq!(queue.process_queue().await, ProcessSummary::default());

        assert_eq!(count_kind(&events, EventKind::QueueEmpty), 1);
        assert_eq!(count_kind(&events, EventKind::ItemAdded), 0);
        assert_eq!(count_kind(&events, EventKind::ItemFailed), 0);
    }

    #[tokio::test]
    async fn concurrent_run_is_rejected_while_one_is_in_flight() {
        let queue = open(&InMemoryStore::new()).await;
        let (started, release) = (Arc::new(Notify::new()), Arc::new(Notify::new()));
        let calls = Arc::new(AtomicU32::new(0));

        let id = queue
            .enqueue("slow", gated_action(&started, &release, &calls, false), serde_json::json!({}), None)
            .await
            .unwrap();

        let first = tokio::spawn({
            let queue = queue.clone();
            async move { queue.process_queue().await }
        });
        started.notified().await;

        assert!(queue.is_processing());
        assert_eq!(queue.get(id).await.unwrap().status, ItemStatus::Processing);
        assert_eq!(queue.process_queue().await, ProcessSummary::default());

        release.notify_one();
        assert_eq!(first.await.unwrap(), summary(1, 1, 0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!queue.is_processing());
    }

    #[tokio::test]
    async fn in_flight_status_is_persisted() {
        let store = InMemoryStore::new();
        let queue = open(&store).await;
        let (started, release) = (Arc::new(Notify::new()), Arc::new(Notify::new()));
        let calls = Arc::new(AtomicU32::new(0));

        queue
            .enqueue("slow", gated_action(&started, &release, &calls, false), serde_json::json!({}), None)
            .await
            .unwrap();

        let run = tokio::spawn({
            let queue = queue.clone();
            async move { queue.process_queue().await }
        });
        started.notified().await;

        assert_eq!(persisted(&store).await[0].status, ItemStatus::Processing);

        release.notify_one();
        run.await.unwrap();
        assert!(persisted(&store).await.is_empty());
    }

    #[tokio::test]
    async fn items_enqueued_mid_run_wait_for_next_run() {
        let queue = open(&InMemoryStore::new()).await;
        let (started, release) = (Arc::new(Notify::new()), Arc::new(Notify::new()));
        let calls = Arc::new(AtomicU32::new(0));

        queue
            .enqueue("first", gated_action(&started, &release, &calls, false), serde_json::json!({}), None)
            .await
            .unwrap();

        let run = tokio::spawn({
            let queue = queue.clone();
            async move { queue.process_queue().await }
        });
        started.notified().await;

        queue
            .enqueue("late", ok_action(), serde_json::json!({}), None)
            .await
            .unwrap();
        release.notify_one();

        assert_eq!(run.await.unwrap(), summary(1, 1, 0));
        assert_eq!(queue.pending_count().await, 1);

        assert_eq!(queue.process_queue().await, summary(1, 1, 0));
        assert_eq!(queue.pending_count().await, 0);
    }

    #[tokio::test]
    async fn fifo_order_is_kept_across_retries() {
        let queue = open(&InMemoryStore::new()).await;
        let log = Arc::new(StdMutex::new(Vec::new()));

        let a = queue
            .enqueue("a", recording_action(&log, "a", true), serde_json::json!({}), Some(2))
            .await
            .unwrap();
        queue
            .enqueue("b", recording_action(&log, "b", false), serde_json::json!({}), None)
            .await
            .unwrap();
        queue
            .enqueue("c", recording_action(&log, "c", false), serde_json::json!({}), None)
            .await
            .unwrap();

        // a's failure does not abort the run
        assert_eq!(queue.process_queue().await, summary(3, 2, 1));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);

        queue
            .enqueue("d", recording_action(&log, "d", false), serde_json::json!({}), None)
            .await
            .unwrap();
        assert_eq!(queue.process_queue().await, summary(2, 1, 1));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c", "a", "d"]);

        let remaining: Vec<ItemId> = queue.items().await.iter().map(|i| i.id).collect();
        assert_eq!(remaining, vec![a]);
    }

    struct Exploding;

    #[async_trait::async_trait]
    impl DeferredAction for Exploding {
        async fn run(&self) -> std::result::Result<(), ActionError> {
            panic!("executor exploded")
        }
    }

    #[tokio::test]
    async fn panicking_action_counts_as_failure_and_run_continues() {
        let queue = open(&InMemoryStore::new()).await;

        let boom = queue
            .enqueue("boom", Arc::new(Exploding), serde_json::json!({}), None)
            .await
            .unwrap();
        queue
            .enqueue("fine", ok_action(), serde_json::json!({}), None)
            .await
            .unwrap();

        assert_eq!(queue.process_queue().await, summary(2, 1, 1));
        assert!(!queue.is_processing());

        let item = queue.get(boom).await.unwrap();
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.attempts, 1);
        assert!(item.last_error.unwrap().contains("executor exploded"));
    }

    #[tokio::test]
    async fn reload_restores_items_without_actions() {
        let store = InMemoryStore::new();
        let queue = open(&store).await;

        let keep = queue
            .enqueue("keep", failing_action("offline"), serde_json::json!({"taskId": 7}), None)
            .await
            .unwrap();
        queue
            .enqueue("second", ok_action(), serde_json::json!({"nested": {"a": [1, 2]}}), Some(5))
            .await
            .unwrap();
        // `second` succeeds and leaves; `keep` stays with one attempt used
        queue.process_queue().await;
        let before = queue.items().await;
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].id, keep);

        let reloaded = open(&store).await;
        assert_eq!(reloaded.items().await, before);
        assert_eq!(reloaded.counts().await.detached, 1);

        let result = reloaded.process_queue().await;
        assert_eq!(result.processed, 0);
        assert_eq!(result.skipped, 1);
        assert_eq!(reloaded.get(keep).await.unwrap().attempts, 1);

        reloaded.reattach(keep, ok_action()).await.unwrap();
        assert_eq!(reloaded.process_queue().await, summary(1, 1, 0));
        assert!(reloaded.is_empty().await);
    }

    #[tokio::test]
    async fn reload_right_after_enqueue_matches_pre_crash_list() {
        let store = InMemoryStore::new();
        let queue = open(&store).await;

        for i in 0..3 {
            queue
                .enqueue(format!("op-{i}"), ok_action(), serde_json::json!({"i": i}), None)
                .await
                .unwrap();
        }
        let before = queue.items().await;
        drop(queue);

        let reloaded = open(&store).await;
        let after = reloaded.items().await;

        assert_eq!(after.len(), before.len());
        for (a, b) in after.iter().zip(before.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.metadata, b.metadata);
            assert_eq!(a.attempts, b.attempts);
            assert_eq!(a.status, b.status);
        }
    }

    #[tokio::test]
    async fn resolver_reattaches_actions_on_reload() {
        let store = InMemoryStore::new();
        {
            let queue = open(&store).await;
            queue
                .enqueue("labels", ok_action(), serde_json::json!({"kind": "label"}), None)
                .await
                .unwrap();
            queue
                .enqueue("other", ok_action(), serde_json::json!({"kind": "unknown"}), None)
                .await
                .unwrap();
        }

        let reloaded = QueueBuilder::new(manual_config())
            .store(Arc::new(store.clone()))
            .resolver(|item: &QueueItem| {
                (item.metadata["kind"] == "label").then(ok_action)
            })
            .build()
            .await
            .unwrap();

        assert_eq!(reloaded.counts().await.detached, 1);
        let result = reloaded.process_queue().await;
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(reloaded.detached_ids().await.len(), 1);
    }

    #[tokio::test]
    async fn crash_mid_attempt_reloads_as_pending() {
        let store = InMemoryStore::new();
        let mut item = QueueItem::new(
            ItemId::from_ulid(ulid::Ulid::new()),
            "crashed",
            serde_json::json!({}),
            3,
            chrono::Utc::now(),
        );
        item.status = ItemStatus::Processing;
        item.attempts = 1;
        store
            .put_raw(KEY, codec::encode("sync", [&item]).unwrap())
            .await;

        let queue = open(&store).await;

        let reloaded = queue.get(item.id).await.unwrap();
        assert_eq!(reloaded.status, ItemStatus::Pending);
        assert_eq!(reloaded.attempts, 1);
        assert_eq!(queue.pending_count().await, 1);
        // reconciled state is written back
        assert_eq!(persisted(&store).await[0].status, ItemStatus::Pending);
    }

    #[tokio::test]
    async fn inconsistent_items_are_isolated_on_reload() {
        let store = InMemoryStore::new();
        let mut item = QueueItem::new(
            ItemId::from_ulid(ulid::Ulid::new()),
            "over",
            serde_json::json!({}),
            2,
            chrono::Utc::now(),
        );
        item.attempts = 5;
        store
            .put_raw(KEY, codec::encode("sync", [&item]).unwrap())
            .await;

        let queue = open(&store).await;

        let reloaded = queue.get(item.id).await.unwrap();
        assert_eq!(reloaded.status, ItemStatus::Failed);
        assert_eq!(reloaded.attempts, 2);
        assert_eq!(queue.pending_count().await, 0);
    }

    #[tokio::test]
    async fn save_failure_is_surfaced_and_memory_stays_authoritative() {
        let store = InMemoryStore::new();
        let queue = open(&store).await;
        let events = record_events(&queue);

        store.fail_saves(true);
        let id = queue
            .enqueue("sync", ok_action(), serde_json::json!({}), None)
            .await
            .unwrap();

        assert!(queue.durability_degraded());
        assert_eq!(count_kind(&events, EventKind::PersistenceFailed), 1);
        assert_eq!(count_kind(&events, EventKind::ItemAdded), 1);
        assert!(queue.get(id).await.is_some());
        assert!(store.snapshot(KEY).await.is_none());

        store.fail_saves(false);
        assert_eq!(queue.process_queue().await, summary(1, 1, 0));
        assert!(!queue.durability_degraded());
        assert!(persisted(&store).await.is_empty());
    }

    #[tokio::test]
    async fn load_failure_starts_empty_and_degraded() {
        let store = InMemoryStore::new();
        store.fail_loads(true);

        let queue = open(&store).await;

        assert!(queue.is_empty().await);
        assert!(queue.durability_degraded());
    }

    #[tokio::test]
    async fn unreadable_bytes_are_backed_up() {
        let store = InMemoryStore::new();
        store.put_raw(KEY, b"{ not json".to_vec()).await;

        let queue = open(&store).await;

        assert!(queue.is_empty().await);
        assert!(queue.durability_degraded());
        let backup = store.snapshot(&format!("{KEY}.corrupt")).await;
        assert_eq!(backup, Some(b"{ not json".to_vec()));
    }

    #[tokio::test]
    async fn clear_all_empties_and_publishes_queue_empty() {
        let store = InMemoryStore::new();
        let queue = open(&store).await;
        let events = record_events(&queue);

        queue
            .enqueue("a", failing_action("x"), serde_json::json!({}), Some(1))
            .await
            .unwrap();
        queue.process_queue().await;
        queue
            .enqueue("b", ok_action(), serde_json::json!({}), None)
            .await
            .unwrap();
        let empties_before = count_kind(&events, EventKind::QueueEmpty);

        assert_eq!(queue.clear_all().await, 2);

        assert!(queue.is_empty().await);
        assert_eq!(count_kind(&events, EventKind::QueueEmpty), empties_before + 1);
        assert!(persisted(&store).await.is_empty());
    }

    #[tokio::test]
    async fn clear_during_flight_does_not_resurrect_item() {
        let queue = open(&InMemoryStore::new()).await;
        let (started, release) = (Arc::new(Notify::new()), Arc::new(Notify::new()));
        let calls = Arc::new(AtomicU32::new(0));

        queue
            .enqueue("slow", gated_action(&started, &release, &calls, true), serde_json::json!({}), None)
            .await
            .unwrap();

        let run = tokio::spawn({
            let queue = queue.clone();
            async move { queue.process_queue().await }
        });
        started.notified().await;

        queue.clear_all().await;
        release.notify_one();

        assert_eq!(run.await.unwrap(), summary(1, 0, 1));
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn remove_and_retry_failed() {
        let queue = open(&InMemoryStore::new()).await;

        let failed = queue
            .enqueue("a", failing_action("x"), serde_json::json!({}), Some(1))
            .await
            .unwrap();
        let pending = queue
            .enqueue("b", failing_action("y"), serde_json::json!({}), Some(5))
            .await
            .unwrap();
        queue.process_queue().await;

        assert!(matches!(
            queue.retry_failed(pending).await,
            Err(QueueError::InvalidArgument(_))
        ));

        queue.retry_failed(failed).await.unwrap();
        let item = queue.get(failed).await.unwrap();
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.attempts, 0);
        assert_eq!(item.last_error.as_deref(), Some("x"));

        let removed = queue.remove(pending).await.unwrap();
        assert_eq!(removed.operation_label, "b");
        assert!(matches!(
            queue.remove(pending).await,
            Err(QueueError::NotFound(id)) if id == pending
        ));
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn retry_all_failed_resets_every_failed_item() {
        let queue = open(&InMemoryStore::new()).await;
        for label in ["a", "b"] {
            queue
                .enqueue(label, failing_action("x"), serde_json::json!({}), Some(1))
                .await
                .unwrap();
        }
        queue.process_queue().await;
        assert_eq!(queue.counts().await.failed, 2);

        assert_eq!(queue.retry_all_failed().await, 2);

        let counts = queue.counts().await;
        assert_eq!(counts.failed, 0);
        assert_eq!(counts.pending, 2);
    }

    #[tokio::test]
    async fn zero_max_attempts_is_rejected() {
        let queue = open(&InMemoryStore::new()).await;
        let result = queue
            .enqueue("bad", ok_action(), serde_json::json!({}), Some(0))
            .await;
        assert!(matches!(result, Err(QueueError::InvalidArgument(_))));
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn failing_event_handler_does_not_break_enqueue() {
        let queue = open(&InMemoryStore::new()).await;
        queue.subscribe(EventKind::ItemAdded, |_| Err("ui toast crashed".into()));
        let events = record_events(&queue);

        queue
            .enqueue("a", ok_action(), serde_json::json!({}), None)
            .await
            .unwrap();

        assert_eq!(count_kind(&events, EventKind::ItemAdded), 1);
    }

    async fn wait_until_empty(queue: &QueueManager) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !queue.is_empty().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("queue did not drain");
    }

    #[tokio::test]
    async fn enqueue_schedules_a_run_when_online() {
        let queue = QueueBuilder::new(QueueConfig::new("sync"))
            .store(Arc::new(InMemoryStore::new()))
            .build()
            .await
            .unwrap();
        let events = record_events(&queue);

        queue
            .enqueue("auto", ok_action(), serde_json::json!({}), None)
            .await
            .unwrap();

        wait_until_empty(&queue).await;
        assert_eq!(count_kind(&events, EventKind::ItemProcessed), 1);
    }

    #[tokio::test]
    async fn enqueue_does_not_schedule_when_offline() {
        let connectivity = Arc::new(ManualConnectivity::new(false));
        let queue = QueueBuilder::new(QueueConfig::new("sync"))
            .store(Arc::new(InMemoryStore::new()))
            .connectivity(connectivity.clone())
            .build()
            .await
            .unwrap();

        queue
            .enqueue("offline", ok_action(), serde_json::json!({}), None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(queue.pending_count().await, 1);

        // manual runs ignore the connectivity signal
        assert_eq!(queue.process_queue().await, summary(1, 1, 0));

        connectivity.set_online(true);
        queue
            .enqueue("online", ok_action(), serde_json::json!({}), None)
            .await
            .unwrap();
        wait_until_empty(&queue).await;
    }

    async fn wait_until_idle(queue: &QueueManager) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while queue.is_processing() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("run did not finish");
    }

    #[tokio::test]
    async fn cancelled_caller_does_not_release_the_run() {
        let queue = open(&InMemoryStore::new()).await;
        let calls = Arc::new(AtomicU32::new(0));
        let running = Arc::new(AtomicU32::new(0));
        let max_running = Arc::new(AtomicU32::new(0));

        let slow = {
            let (calls, running, max_running) =
                (Arc::clone(&calls), Arc::clone(&running), Arc::clone(&max_running));
            action_fn(move || {
                let (calls, running, max_running) =
                    (Arc::clone(&calls), Arc::clone(&running), Arc::clone(&max_running));
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    max_running.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
        };
        queue
            .enqueue("slow", slow, serde_json::json!({}), None)
            .await
            .unwrap();

        let cancelled =
            tokio::time::timeout(Duration::from_millis(50), queue.process_queue()).await;
        assert!(cancelled.is_err());

        // the abandoned run still owns the flag
        assert!(queue.is_processing());
        assert_eq!(queue.process_queue().await, ProcessSummary::default());

        wait_until_empty(&queue).await;
        wait_until_idle(&queue).await;
        assert_eq!(queue.process_queue().await, ProcessSummary::default());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(max_running.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn save_failure_during_run_still_applies_transition_in_memory() {
        let store = InMemoryStore::new();
        let queue = open(&store).await;
        let id = queue
            .enqueue("push", failing_action("HTTP 500"), serde_json::json!({}), Some(1))
            .await
            .unwrap();
        let events = record_events(&queue);

        store.fail_saves(true);
        assert_eq!(queue.process_queue().await, summary(1, 0, 1));

        let item = queue.get(id).await.unwrap();
        assert_eq!(item.status, ItemStatus::Failed);
        assert_eq!(item.attempts, 1);
        assert!(queue.durability_degraded());

        let kinds: Vec<EventKind> = events.lock().unwrap().iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::PersistenceFailed,
                EventKind::PersistenceFailed,
                EventKind::ItemFailed,
                EventKind::QueueEmpty,
            ]
        );

        // the store still holds the state from before the run
        let stored = persisted(&store).await;
        assert_eq!(stored[0].status, ItemStatus::Pending);
        assert_eq!(stored[0].attempts, 0);
    }

    #[tokio::test]
    async fn stale_processing_items_are_persisted_as_pending() {
        let store = InMemoryStore::new();
        let queue = open(&store).await;
        let id = queue
            .enqueue("left", ok_action(), serde_json::json!({}), None)
            .await
            .unwrap();
        {
            let mut state = queue.lock().await;
            let entry = state.find_mut(id).unwrap();
            entry.item.status = ItemStatus::Processing;
            entry.action = None;
            assert!(queue.persist(&state).await.is_none());
        }
        assert_eq!(persisted(&store).await[0].status, ItemStatus::Processing);

        let result = queue.process_queue().await;

        assert_eq!(result.skipped, 1);
        assert_eq!(queue.get(id).await.unwrap().status, ItemStatus::Pending);
        assert_eq!(persisted(&store).await[0].status, ItemStatus::Pending);
    }

    #[tokio::test]
    async fn item_processed_reports_the_item_before_its_last_attempt() {
        let queue = open(&InMemoryStore::new()).await;
        let events = record_events(&queue);
        let calls = Arc::new(AtomicU32::new(0));
        let flaky = {
            let calls = Arc::clone(&calls);
            action_fn(move || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ActionError::new("first try"))
                    } else {
                        Ok(())
                    }
                }
            })
        };
        queue
            .enqueue("flaky", flaky, serde_json::json!({}), None)
            .await
            .unwrap();

        queue.process_queue().await;
        assert_eq!(queue.process_queue().await, summary(1, 1, 0));

        let processed: Vec<QueueItem> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                QueueEvent::ItemProcessed(item) => Some(item.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(processed.len(), 1);
        assert_eq!(processed[0].status, ItemStatus::Pending);
        assert_eq!(processed[0].attempts, 1);
        assert_eq!(processed[0].last_error.as_deref(), Some("first try"));
    }
}
