//! # Sync Engine
//!
//! Drains the offline operation queue against the remote side whenever the
//! device is online.
//!
//! ## Architecture
//!
//! The engine coordinates these components:
//! - **Network Monitor**: Connectivity detection and reachability probing
//! - **Operation Queue**: Durable FIFO of pending mutations
//! - **Retry Manager**: Advisory backoff between attempts
//! - **Scheduler**: Periodic catch-up interval, adapted to network quality
//! - **Executor**: The deployment's remote API
//! - **Metrics**: Cumulative cycle counters
//!
//! ## Drain cycle
//!
//! A cycle claims the oldest eligible operation, executes it, records the
//! outcome and repeats until nothing is eligible. Operations run strictly one
//! at a time. A failed operation becomes eligible again once its backoff
//! deadline has passed; the engine never sleeps waiting for one. A network
//! error ends the cycle early and automatic draining pauses until the
//! monitor reports a reconnect.
//!
//! Only one cycle runs at a time. Triggers arriving while a cycle is running
//! join it instead of starting another.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zaptap_sync::offline::OperationQueue;
//! use zaptap_sync::shared::{EventBus, SyncConfig};
//! use zaptap_sync::sync::{
//!     ConnectivityMonitor, ExecutorRegistry, ManualConnectivity, NetInfoState, SyncEngine,
//! };
//!
//! # async fn run() -> zaptap_sync::Result<()> {
//! let config = SyncConfig::default();
//! let events = Arc::new(EventBus::new(config.event_capacity));
//! let source = Arc::new(ManualConnectivity::new(NetInfoState::wifi()));
//! let monitor = Arc::new(ConnectivityMonitor::new(source, None, Arc::clone(&events), &config));
//! let queue = Arc::new(OperationQueue::in_memory(config.max_attempts));
//! let executor = Arc::new(ExecutorRegistry::new().with("save", |_| async { Ok(()) }));
//!
//! let engine = SyncEngine::new(queue.clone(), executor, monitor, events, config).await?;
//! engine.start();
//!
//! queue.enqueue("save", serde_json::json!({ "id": 1 })).await?;
//! let progress = engine.force_sync().await?;
//! println!("Synced {} operations", progress.completed);
//! # Ok(())
//! # }
//! ```

pub mod executor;
pub mod metrics;
pub mod network_monitor;
pub mod quality;
pub mod scheduler;
pub mod sync_state;

pub use executor::{ExecutorRegistry, HandlerFuture, RemoteExecutor, RestExecutor};
pub use metrics::SyncMetrics;
pub use network_monitor::{
    CellularGeneration, ConnectionDetails, ConnectionType, Connectivity, ConnectivityMonitor,
    ConnectivitySource, HttpProbe, ManualConnectivity, NetInfoState, ReachabilityProbe,
};
pub use quality::NetworkQuality;
pub use scheduler::SyncScheduler;
pub use sync_state::{NetworkSnapshot, SyncProgress};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::offline::queue::{Operation, OperationQueue, OperationState};
use crate::offline::retry::RetryManager;
use crate::shared::config::SyncConfig;
use crate::shared::error::{ExecutionError, Result, SyncError};
use crate::shared::event::{EventBus, SyncEvent};
use sync_state::CycleTally;

/// Terminal result of one drain cycle
pub type CycleOutcome = Result<SyncProgress>;

type CycleSlot = watch::Receiver<Option<CycleOutcome>>;

/// Background sync coordinator
#[derive(Debug, Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

#[derive(Debug)]
struct EngineInner {
    config: SyncConfig,
    queue: Arc<OperationQueue>,
    executor: Arc<dyn RemoteExecutor>,
    monitor: Arc<ConnectivityMonitor>,
    events: Arc<EventBus>,
    retry: RetryManager,
    scheduler: SyncScheduler,
    metrics: RwLock<SyncMetrics>,
    progress: RwLock<SyncProgress>,
    last_sync_time: RwLock<Option<DateTime<Utc>>>,
    /// Set when a cycle ended on a network error
    awaiting_reconnect: AtomicBool,
    /// Outcome channel of the running cycle
    active: Mutex<Option<CycleSlot>>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Create an engine over an opened queue
    pub async fn new(
        queue: Arc<OperationQueue>,
        executor: Arc<dyn RemoteExecutor>,
        monitor: Arc<ConnectivityMonitor>,
        events: Arc<EventBus>,
        config: SyncConfig,
    ) -> Result<Self> {
        let last_sync_time = queue.last_sync_time().await?;

        Ok(Self {
            inner: Arc::new(EngineInner {
                retry: RetryManager::new(config.retry_policy()),
                scheduler: SyncScheduler::new(config.sync_interval),
                config,
                queue,
                executor,
                monitor,
                events,
                metrics: RwLock::new(SyncMetrics::new()),
                progress: RwLock::new(SyncProgress::default()),
                last_sync_time: RwLock::new(last_sync_time),
                awaiting_reconnect: AtomicBool::new(false),
                active: Mutex::new(None),
                tasks: std::sync::Mutex::new(Vec::new()),
            }),
        })
    }

    /// Start the reconnect and periodic triggers
    pub fn start(&self) {
        let mut tasks = self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if !tasks.is_empty() {
            tracing::debug!("[Sync] Engine already started");
            return;
        }

        let engine = self.clone();
        let connectivity = self.inner.monitor.watch();
        tasks.push(tokio::spawn(async move {
            engine.connectivity_loop(connectivity).await;
        }));

        let engine = self.clone();
        tasks.push(tokio::spawn(async move {
            engine.periodic_loop().await;
        }));

        tracing::info!(
            "[Sync] Engine started (interval {:?})",
            self.inner.config.sync_interval
        );
    }

    /// Stop the background triggers
    ///
    /// A cycle that is already running finishes on its own.
    pub fn stop(&self) {
        let handles: Vec<_> = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            handle.abort();
        }
    }

    /// Run a drain cycle now and wait for it
    ///
    /// Joins the running cycle if there is one. Otherwise connectivity is
    /// re-checked first and the call fails with `SyncError::Offline` without
    /// attempting any operation.
    pub async fn force_sync(&self) -> Result<SyncProgress> {
        if let Some(running) = self.running_cycle().await {
            tracing::debug!("[Sync] Joining running cycle");
            return Self::wait_for(running).await;
        }

        let connectivity = self.inner.monitor.refresh().await;
        if !connectivity.is_online() {
            tracing::warn!("[Sync] Force sync rejected: offline");
            self.inner.events.emit(SyncEvent::SyncFailed {
                progress: SyncProgress::default(),
                error: SyncError::Offline,
            });
            return Err(SyncError::Offline);
        }

        self.inner.awaiting_reconnect.store(false, Ordering::SeqCst);
        let cycle = self.trigger().await;
        Self::wait_for(cycle).await
    }

    /// Whether a cycle is running
    pub async fn is_syncing(&self) -> bool {
        self.inner.progress.read().await.in_progress
    }

    /// Running totals of the current cycle, zero baseline when idle
    pub async fn progress(&self) -> SyncProgress {
        *self.inner.progress.read().await
    }

    /// Completion time of the last successful cycle
    pub async fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_sync_time.read().await
    }

    /// Cumulative cycle counters
    pub async fn metrics(&self) -> SyncMetrics {
        self.inner.metrics.read().await.clone()
    }

    /// Whether automatic draining is paused after a lost connection
    pub fn is_awaiting_reconnect(&self) -> bool {
        self.inner.awaiting_reconnect.load(Ordering::SeqCst)
    }

    pub fn queue(&self) -> &Arc<OperationQueue> {
        &self.inner.queue
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.inner.monitor
    }

    pub fn scheduler(&self) -> &SyncScheduler {
        &self.inner.scheduler
    }

    async fn running_cycle(&self) -> Option<CycleSlot> {
        self.inner.active.lock().await.clone()
    }

    /// Start a cycle unless one is running; returns its outcome channel
    async fn trigger(&self) -> CycleSlot {
        let mut active = self.inner.active.lock().await;
        if let Some(running) = active.as_ref() {
            return running.clone();
        }

        let (tx, rx) = watch::channel(None);
        *active = Some(rx.clone());
        *self.inner.progress.write().await = SyncProgress {
            in_progress: true,
            ..SyncProgress::default()
        };

        let engine = self.clone();
        tokio::spawn(async move {
            let outcome = engine.run_cycle().await;
            engine.inner.active.lock().await.take();
            tx.send_replace(Some(outcome));
        });
        rx
    }

    async fn wait_for(mut cycle: CycleSlot) -> CycleOutcome {
        match cycle.wait_for(Option::is_some).await {
            Ok(outcome) => outcome
                .clone()
                .unwrap_or_else(|| Err(SyncError::connection_lost("sync cycle ended without outcome"))),
            Err(_) => Err(SyncError::connection_lost("sync cycle was aborted")),
        }
    }

    async fn run_cycle(&self) -> CycleOutcome {
        let inner = &self.inner;
        inner.metrics.write().await.record_sync_start();

        let stats = inner.queue.get_stats().await;
        let pending = stats.pending + stats.failed;
        tracing::info!("[Sync] Drain started ({} awaiting)", pending);
        inner.events.emit(SyncEvent::SyncStarted { pending });

        let mut tally = CycleTally::default();
        let drained = match self.drain(&mut tally).await {
            Ok(()) => {
                let finished_at = Utc::now();
                inner
                    .queue
                    .record_sync_time(finished_at)
                    .await
                    .map(|()| finished_at)
            }
            Err(e) => Err(e),
        };

        let progress = tally.progress(false);
        inner.scheduler.record_sync().await;
        *inner.progress.write().await = SyncProgress::default();

        match drained {
            Ok(finished_at) => {
                *inner.last_sync_time.write().await = Some(finished_at);
                inner.metrics.write().await.record_sync_success();
                tracing::info!(
                    "[Sync] Drain completed: {}/{} succeeded",
                    progress.completed,
                    progress.total
                );
                inner.events.emit(SyncEvent::SyncCompleted {
                    progress,
                    finished_at,
                });
                Ok(progress)
            }
            Err(error) => {
                inner.metrics.write().await.record_sync_failure();
                tracing::warn!("[Sync] Drain failed: {}", error);
                inner.events.emit(SyncEvent::SyncFailed {
                    progress,
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    async fn drain(&self, tally: &mut CycleTally) -> Result<()> {
        let inner = &self.inner;

        loop {
            let now = Instant::now();
            let claimed = inner
                .queue
                .dequeue_next_eligible(|op| inner.retry.is_ready(&op.id, now))
                .await
                .inspect_err(|e| tracing::error!("[Sync] Failed to claim operation: {}", e))?;
            let Some(op) = claimed else {
                return Ok(());
            };

            let attempt = op.attempts + 1;
            tracing::debug!("[Sync] Executing {} ({}) attempt {}", op.id, op.kind, attempt);

            let timeout = inner.config.timeout_for(op.kind.as_str());
            let result = tokio::time::timeout(timeout, inner.executor.execute(&op.kind, &op.payload))
                .await
                .unwrap_or(Err(ExecutionError::Timeout { after: timeout }));

            match result {
                Ok(()) => {
                    if let Err(e) = inner.queue.mark_completed(&op.id).await {
                        return Err(self.abandon_claim(&op, e).await);
                    }
                    inner.retry.cancel_retry(&op.id);
                    inner.metrics.write().await.record_operation(true, false);
                    tally.record(op.id, true);
                    inner.events.emit(SyncEvent::OperationCompleted {
                        id: op.id,
                        kind: op.kind.clone(),
                    });
                    self.publish_progress(tally).await;
                }
                Err(error) => {
                    let message = error.to_string();
                    let state = match inner.queue.mark_failed(&op.id, message.clone()).await {
                        Ok(state) => state,
                        Err(e) => return Err(self.abandon_claim(&op, e).await),
                    };
                    let dead_lettered = state == OperationState::DeadLetter;
                    if dead_lettered {
                        inner.retry.cancel_retry(&op.id);
                    } else {
                        inner.retry.schedule_retry(op.id, attempt);
                    }

                    tracing::warn!(
                        "[Sync] Operation {} ({}) failed on attempt {}: {}",
                        op.id,
                        op.kind,
                        attempt,
                        message
                    );
                    inner.metrics.write().await.record_operation(false, dead_lettered);
                    tally.record(op.id, false);
                    inner.events.emit(SyncEvent::OperationFailed {
                        id: op.id,
                        kind: op.kind.clone(),
                        error: message,
                        attempts: attempt,
                        dead_lettered,
                    });
                    self.publish_progress(tally).await;

                    if error.is_network() {
                        inner.awaiting_reconnect.store(true, Ordering::SeqCst);
                        return Err(SyncError::connection_lost(error.to_string()));
                    }
                }
            }
        }
    }

    /// The outcome of `op` could not be recorded; hand it back to the queue
    async fn abandon_claim(&self, op: &Operation, error: SyncError) -> SyncError {
        tracing::error!(
            "[Sync] Failed to record outcome of {} ({}): {}",
            op.id,
            op.kind,
            error
        );
        self.inner.queue.release_claim(&op.id).await;
        error
    }

    async fn publish_progress(&self, tally: &CycleTally) {
        let progress = tally.progress(true);
        *self.inner.progress.write().await = progress;
        self.inner.events.emit(SyncEvent::SyncProgress { progress });
    }

    /// Whether anything is waiting to be executed
    async fn has_work(&self) -> bool {
        let stats = self.inner.queue.get_stats().await;
        stats.pending + stats.failed > 0
    }

    /// Drain on every offline → online transition
    async fn connectivity_loop(&self, mut connectivity: watch::Receiver<Connectivity>) {
        let mut was_online = connectivity.borrow_and_update().is_online();

        while connectivity.changed().await.is_ok() {
            let current = *connectivity.borrow_and_update();
            self.inner.scheduler.adjust_interval(current.quality()).await;

            let online = current.is_online();
            if online && !was_online {
                self.inner.awaiting_reconnect.store(false, Ordering::SeqCst);
                if self.has_work().await {
                    tracing::info!("[Sync] Connectivity restored, draining queue");
                    self.trigger().await;
                }
            }
            was_online = online;
        }
        tracing::debug!("[Sync] Connectivity watch closed");
    }

    /// Opportunistic catch-up while connected
    async fn periodic_loop(&self) {
        let mut ticker = tokio::time::interval(self.inner.config.sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;

            if !self.inner.monitor.current().is_online()
                || self.is_awaiting_reconnect()
                || !self.inner.scheduler.should_sync().await
            {
                continue;
            }
            if self.running_cycle().await.is_some() || !self.has_work().await {
                continue;
            }

            tracing::debug!("[Sync] Periodic drain");
            self.trigger().await;
        }
    }
}
