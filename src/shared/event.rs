//! Sync Event System
//!
//! Typed events emitted by the connectivity monitor and the sync engine, and
//! the `EventBus` that delivers them.
//!
//! # Delivery
//!
//! Two ways to listen, both fed by the same `emit` call:
//!
//! - **Listeners** registered per `EventKind` with `on`, removed with `off`.
//!   They run synchronously inside `emit` and must not block.
//! - **Channel subscribers** from `subscribe`, backed by
//!   `tokio::sync::broadcast`. Every subscriber receives a copy of each
//!   event; a slow subscriber lags instead of blocking the engine.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::offline::queue::{OperationId, OperationKind};
use crate::shared::error::SyncError;
use crate::sync::network_monitor::Connectivity;
use crate::sync::quality::NetworkQuality;
use crate::sync::sync_state::SyncProgress;

/// Event tag, used for listener registration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NetworkChanged,
    SyncStarted,
    SyncProgress,
    SyncCompleted,
    SyncFailed,
    OperationCompleted,
    OperationFailed,
}

impl EventKind {
    /// Wire name of the event (`network_changed`, ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkChanged => "network_changed",
            Self::SyncStarted => "sync_started",
            Self::SyncProgress => "sync_progress",
            Self::SyncCompleted => "sync_completed",
            Self::SyncFailed => "sync_failed",
            Self::OperationCompleted => "operation_completed",
            Self::OperationFailed => "operation_failed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event payloads
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The normalized connectivity tuple changed
    NetworkChanged {
        connectivity: Connectivity,
        quality: NetworkQuality,
    },
    /// A drain cycle began
    SyncStarted {
        /// Operations awaiting execution when the cycle began
        pending: usize,
    },
    /// One attempt settled; running totals for the cycle
    SyncProgress { progress: SyncProgress },
    /// The cycle drained everything eligible
    SyncCompleted {
        progress: SyncProgress,
        finished_at: DateTime<Utc>,
    },
    /// The cycle ended on a cycle-level failure
    SyncFailed {
        progress: SyncProgress,
        error: SyncError,
    },
    /// An operation reached `completed`
    OperationCompleted {
        id: OperationId,
        kind: OperationKind,
    },
    /// An attempt failed
    OperationFailed {
        id: OperationId,
        kind: OperationKind,
        error: String,
        attempts: u32,
        dead_lettered: bool,
    },
}

impl SyncEvent {
    /// Tag of this event
    pub fn kind(&self) -> EventKind {
        match self {
            Self::NetworkChanged { .. } => EventKind::NetworkChanged,
            Self::SyncStarted { .. } => EventKind::SyncStarted,
            Self::SyncProgress { .. } => EventKind::SyncProgress,
            Self::SyncCompleted { .. } => EventKind::SyncCompleted,
            Self::SyncFailed { .. } => EventKind::SyncFailed,
            Self::OperationCompleted { .. } => EventKind::OperationCompleted,
            Self::OperationFailed { .. } => EventKind::OperationFailed,
        }
    }
}

/// Listener callback
pub type Listener = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

/// Handle returned by `EventBus::on`, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Event dispatcher shared by the monitor, the engine and the facade
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
    listeners: RwLock<HashMap<EventKind, Vec<(ListenerId, Listener)>>>,
    next_listener: AtomicU64,
}

impl EventBus {
    /// Create a bus whose channel buffers `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            listeners: RwLock::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    /// Register a listener for one event kind
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Unregister a listener; returns `false` if it was not registered
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        for entries in listeners.values_mut() {
            if let Some(index) = entries.iter().position(|(entry_id, _)| *entry_id == id) {
                entries.remove(index);
                return true;
            }
        }
        false
    }

    /// Channel receiving every event emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Deliver an event to listeners and channel subscribers
    ///
    /// Returns the number of channel subscribers that received it.
    pub fn emit(&self, event: SyncEvent) -> usize {
        let kind = event.kind();
        let targets: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map(|entries| entries.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();
        for listener in targets {
            listener(&event);
        }

        match self.tx.send(event) {
            Ok(subscriber_count) => subscriber_count,
            Err(_) => {
                // No subscribers, that's okay
                tracing::trace!("[Events] No subscribers for {}", kind);
                0
            }
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self
            .listeners
            .read()
            .map(|l| l.values().map(Vec::len).sum::<usize>())
            .unwrap_or_default();
        f.debug_struct("EventBus")
            .field("subscribers", &self.tx.receiver_count())
            .field("listeners", &listeners)
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
