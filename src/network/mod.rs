//! # Network Facade
//!
//! Single entry point for the presentation layer. Wires the connectivity
//! monitor, the operation queue and the sync engine together, keeps an
//! aggregated `NetworkSnapshot` current, and exposes the few actions the UI
//! is allowed to take.
//!
//! The facade never mutates operation records itself; everything goes
//! through the queue and engine actions.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zaptap_sync::network::NetworkFacade;
//! use zaptap_sync::shared::SyncConfig;
//! use zaptap_sync::sync::{ManualConnectivity, NetInfoState, RestExecutor};
//!
//! # async fn run() -> zaptap_sync::Result<()> {
//! let config = SyncConfig::from_env()?;
//! let source = Arc::new(ManualConnectivity::new(NetInfoState::wifi()));
//! let executor = Arc::new(RestExecutor::new("https://api.zaptap.app/v1"));
//!
//! let network = NetworkFacade::open(config, source, executor).await?;
//! let mut snapshots = network.watch_snapshot();
//!
//! network.enqueue("create-automation", serde_json::json!({ "name": "Morning" })).await?;
//! snapshots.changed().await.ok();
//! println!("{} pending", snapshots.borrow().pending_operations);
//!
//! network.shutdown();
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::local_db::SqliteStore;
use crate::offline::queue::{OperationId, OperationKind, OperationQueue};
use crate::offline::store::PersistentStore;
use crate::shared::config::SyncConfig;
use crate::shared::error::Result;
use crate::shared::event::{EventBus, EventKind, ListenerId, SyncEvent};
use crate::sync::executor::RemoteExecutor;
use crate::sync::network_monitor::{
    ConnectivityMonitor, ConnectivitySource, HttpProbe, ReachabilityProbe,
};
use crate::sync::sync_state::{NetworkSnapshot, SyncProgress};
use crate::sync::SyncEngine;

/// Aggregated network and sync state plus the UI-facing actions
#[derive(Debug)]
pub struct NetworkFacade {
    config: SyncConfig,
    events: Arc<EventBus>,
    monitor: Arc<ConnectivityMonitor>,
    queue: Arc<OperationQueue>,
    engine: SyncEngine,
    snapshot: watch::Sender<NetworkSnapshot>,
    updater: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkFacade {
    /// Wire up the sync core over the given collaborators and start it
    pub async fn start(
        config: SyncConfig,
        source: Arc<dyn ConnectivitySource>,
        probe: Option<Arc<dyn ReachabilityProbe>>,
        executor: Arc<dyn RemoteExecutor>,
        store: Arc<dyn PersistentStore>,
    ) -> Result<Self> {
        config.validate()?;

        let events = Arc::new(EventBus::new(config.event_capacity));
        let queue = Arc::new(OperationQueue::open(store, config.max_attempts).await?);
        let monitor = Arc::new(ConnectivityMonitor::new(
            source,
            probe,
            Arc::clone(&events),
            &config,
        ));
        let engine = SyncEngine::new(
            Arc::clone(&queue),
            executor,
            Arc::clone(&monitor),
            Arc::clone(&events),
            config.clone(),
        )
        .await?;

        let (snapshot, _) = watch::channel(NetworkSnapshot::default());
        let facade = Self {
            config,
            events,
            monitor,
            queue,
            engine,
            snapshot,
            updater: Mutex::new(None),
        };

        facade.spawn_updater();
        facade.monitor.refresh().await;
        facade.monitor.start();
        facade.engine.start();
        facade.refresh_snapshot().await;

        tracing::info!("[Network] Sync core started");
        Ok(facade)
    }

    /// Start over the SQLite queue at `config.database_path`, probing
    /// reachability over HTTP
    pub async fn open(
        config: SyncConfig,
        source: Arc<dyn ConnectivitySource>,
        executor: Arc<dyn RemoteExecutor>,
    ) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(&config.database_path).await?);
        let probe: Arc<dyn ReachabilityProbe> = Arc::new(HttpProbe::from_config(&config));
        Self::start(config, source, Some(probe), executor, store).await
    }

    /// Queue a remote mutation
    pub async fn enqueue(
        &self,
        kind: impl Into<OperationKind>,
        payload: Value,
    ) -> Result<OperationId> {
        let id = self.queue.enqueue(kind, payload).await?;
        self.refresh_snapshot().await;
        Ok(id)
    }

    /// Drain now; resolves when the triggered or running cycle finishes
    pub async fn force_sync(&self) -> Result<SyncProgress> {
        let result = self.engine.force_sync().await;
        self.refresh_snapshot().await;
        result
    }

    /// Requeue every dead-lettered operation and drain
    ///
    /// Returns how many operations were requeued. A follow-up drain that
    /// cannot run (offline, connection lost) is logged, not returned; the
    /// requeued operations stay pending for the next trigger.
    pub async fn retry_failed_operations(&self) -> Result<usize> {
        let mut requeued = 0;
        for op in self.queue.get_dead_letter_queue().await {
            if self.queue.requeue_from_dead_letter(&op.id).await? {
                requeued += 1;
            }
        }
        tracing::info!("[Network] Requeued {} dead-lettered operations", requeued);

        if requeued > 0 {
            match self.engine.force_sync().await {
                Ok(_) => {}
                Err(e) if e.is_offline() => {
                    tracing::warn!("[Network] Drain after requeue did not run: {}", e)
                }
                Err(e) => return Err(e),
            }
        }
        self.refresh_snapshot().await;
        Ok(requeued)
    }

    /// Remove completed operations from the queue
    pub async fn clear_completed_operations(&self) -> Result<usize> {
        let removed = self.queue.clear_completed().await?;
        self.refresh_snapshot().await;
        Ok(removed)
    }

    /// Freshly computed snapshot
    pub async fn snapshot(&self) -> NetworkSnapshot {
        build_snapshot(&self.monitor, &self.queue, &self.engine).await
    }

    /// Receiver updated after every event and action
    pub fn watch_snapshot(&self) -> watch::Receiver<NetworkSnapshot> {
        self.snapshot.subscribe()
    }

    /// Register a listener for one event kind
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, listener)
    }

    /// Remove a listener registered with `on`
    pub fn off(&self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    /// Channel of every event from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<OperationQueue> {
        &self.queue
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    /// Stop all background tasks
    pub fn shutdown(&self) {
        self.engine.stop();
        self.monitor.stop();
        if let Some(handle) = self
            .updater
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
            tracing::info!("[Network] Sync core stopped");
        }
    }

    async fn refresh_snapshot(&self) {
        let next = self.snapshot().await;
        self.snapshot.send_replace(next);
    }

    fn spawn_updater(&self) {
        let mut events = self.events.subscribe();
        let monitor = Arc::clone(&self.monitor);
        let queue = Arc::clone(&self.queue);
        let engine = self.engine.clone();
        let snapshot = self.snapshot.clone();

        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("[Network] Snapshot updater skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                let next = build_snapshot(&monitor, &queue, &engine).await;
                snapshot.send_if_modified(|current| {
                    if *current != next {
                        *current = next;
                        true
                    } else {
                        false
                    }
                });
            }
        });

        *self.updater.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }
}

impl Drop for NetworkFacade {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn build_snapshot(
    monitor: &ConnectivityMonitor,
    queue: &OperationQueue,
    engine: &SyncEngine,
) -> NetworkSnapshot {
    let connectivity = monitor.current();
    let stats = queue.get_stats().await;
    NetworkSnapshot::new(
        &connectivity,
        &stats,
        engine.progress().await,
        engine.last_sync_time().await,
    )
}
