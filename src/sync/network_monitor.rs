//! # Network Monitor
//!
//! Turns raw platform connectivity reports into a normalized connectivity
//! tuple and announces changes.
//!
//! ## Features
//!
//! - **Connectivity Detection**: Online/offline status from the platform
//! - **Reachability Probe**: HTTP check that separates "has an interface"
//!   from "has working internet"
//! - **Change Events**: `network_changed` fires only when the normalized
//!   tuple actually differs from the previous one
//!
//! The monitor never touches the operation queue.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::shared::config::SyncConfig;
use crate::shared::event::{EventBus, SyncEvent};
use crate::sync::quality::NetworkQuality;

/// Interface type reported by the platform
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Wifi,
    Ethernet,
    Cellular,
    Bluetooth,
    Vpn,
    Other,
    #[default]
    Unknown,
    None,
}

/// Cellular radio generation, when the platform reports one
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CellularGeneration {
    #[serde(rename = "2g")]
    G2,
    #[serde(rename = "3g")]
    G3,
    #[serde(rename = "4g")]
    G4,
    #[serde(rename = "5g")]
    G5,
}

/// Platform-specific details; every field may be missing
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionDetails {
    pub cellular_generation: Option<CellularGeneration>,
}

/// Raw state as reported by the platform primitive
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetInfoState {
    pub is_connected: Option<bool>,
    pub is_internet_reachable: Option<bool>,
    pub connection_type: ConnectionType,
    pub details: Option<ConnectionDetails>,
}

impl NetInfoState {
    /// Connected over wifi with reachable internet
    pub fn wifi() -> Self {
        Self {
            is_connected: Some(true),
            is_internet_reachable: Some(true),
            connection_type: ConnectionType::Wifi,
            details: None,
        }
    }

    /// Connected over cellular with reachable internet
    pub fn cellular(generation: Option<CellularGeneration>) -> Self {
        Self {
            is_connected: Some(true),
            is_internet_reachable: Some(true),
            connection_type: ConnectionType::Cellular,
            details: Some(ConnectionDetails {
                cellular_generation: generation,
            }),
        }
    }

    /// No interface
    pub fn disconnected() -> Self {
        Self {
            is_connected: Some(false),
            is_internet_reachable: Some(false),
            connection_type: ConnectionType::None,
            details: None,
        }
    }

    /// Override internet reachability
    pub fn with_reachable(mut self, reachable: Option<bool>) -> Self {
        self.is_internet_reachable = reachable;
        self
    }
}

/// Normalized connectivity tuple
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Connectivity {
    pub is_connected: bool,
    /// `None` while reachability is not yet known
    pub is_internet_reachable: Option<bool>,
    pub connection_type: ConnectionType,
    pub cellular_generation: Option<CellularGeneration>,
}

impl Connectivity {
    /// Disconnected tuple, the state before anything is known
    pub fn offline() -> Self {
        Self {
            is_connected: false,
            is_internet_reachable: None,
            connection_type: ConnectionType::None,
            cellular_generation: None,
        }
    }

    /// Normalize a platform report
    pub fn from_state(state: &NetInfoState) -> Self {
        let is_connected =
            state.is_connected.unwrap_or(false) && state.connection_type != ConnectionType::None;
        let cellular_generation = match state.connection_type {
            ConnectionType::Cellular => state.details.as_ref().and_then(|d| d.cellular_generation),
            _ => None,
        };
        Self {
            is_connected,
            is_internet_reachable: state.is_internet_reachable,
            connection_type: state.connection_type,
            cellular_generation,
        }
    }

    /// Connected, and reachability not known to be broken
    pub fn is_online(&self) -> bool {
        self.is_connected && self.is_internet_reachable != Some(false)
    }

    /// Derived quality level
    pub fn quality(&self) -> NetworkQuality {
        NetworkQuality::classify(self)
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::offline()
    }
}

/// Platform connectivity primitive
///
/// Dropping the receiver returned by `subscribe` unsubscribes.
#[async_trait]
pub trait ConnectivitySource: Send + Sync + std::fmt::Debug {
    /// Current platform state
    async fn fetch_current(&self) -> NetInfoState;

    /// Stream of platform state changes
    fn subscribe(&self) -> watch::Receiver<NetInfoState>;
}

/// Connectivity source the host application pushes platform reports into
#[derive(Debug)]
pub struct ManualConnectivity {
    tx: watch::Sender<NetInfoState>,
}

impl ManualConnectivity {
    pub fn new(initial: NetInfoState) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Report a new platform state
    pub fn set(&self, state: NetInfoState) {
        self.tx.send_replace(state);
    }

    /// Last reported state
    pub fn current(&self) -> NetInfoState {
        self.tx.borrow().clone()
    }
}

#[async_trait]
impl ConnectivitySource for ManualConnectivity {
    async fn fetch_current(&self) -> NetInfoState {
        self.current()
    }

    fn subscribe(&self) -> watch::Receiver<NetInfoState> {
        self.tx.subscribe()
    }
}

/// Checks whether the public internet answers
#[async_trait]
pub trait ReachabilityProbe: Send + Sync + std::fmt::Debug {
    async fn probe(&self, timeout: Duration) -> bool;
}

/// `HEAD` request against a known endpoint
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// Probe the configured reachability endpoint
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.reachability_url.clone())
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn probe(&self, timeout: Duration) -> bool {
        match self.client.head(&self.url).timeout(timeout).send().await {
            Ok(response) => {
                let reachable = response.status().is_success();
                tracing::debug!("[Network] Probe {} -> {}", self.url, response.status());
                reachable
            }
            Err(e) => {
                tracing::debug!("[Network] Probe {} failed: {}", self.url, e);
                false
            }
        }
    }
}

/// Normalizes platform reports and publishes connectivity changes
#[derive(Debug)]
pub struct ConnectivityMonitor {
    source: Arc<dyn ConnectivitySource>,
    probe: Option<Arc<dyn ReachabilityProbe>>,
    events: Arc<EventBus>,
    state: watch::Sender<Connectivity>,
    probe_timeout: Duration,
    probe_interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectivityMonitor {
    pub fn new(
        source: Arc<dyn ConnectivitySource>,
        probe: Option<Arc<dyn ReachabilityProbe>>,
        events: Arc<EventBus>,
        config: &SyncConfig,
    ) -> Self {
        let (state, _) = watch::channel(Connectivity::offline());
        Self {
            source,
            probe,
            events,
            state,
            probe_timeout: config.probe_timeout,
            probe_interval: config.probe_interval,
            task: Mutex::new(None),
        }
    }

    /// Latest normalized connectivity
    pub fn current(&self) -> Connectivity {
        *self.state.borrow()
    }

    /// Receiver notified on every connectivity change
    pub fn watch(&self) -> watch::Receiver<Connectivity> {
        self.state.subscribe()
    }

    /// Re-read the platform state, probing reachability if possible
    pub async fn refresh(&self) -> Connectivity {
        let state = self.source.fetch_current().await;
        let mut next = Connectivity::from_state(&state);
        if next.is_connected {
            if let Some(reachable) = self.probe_now().await {
                next.is_internet_reachable = Some(reachable);
            }
        }
        self.apply(next);
        next
    }

    /// Start following platform changes and probing periodically
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return;
        }

        let monitor = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            monitor.run().await;
        }));
    }

    /// Stop the background task
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }

    async fn run(&self) {
        let mut platform = self.source.subscribe();
        let mut probe_timer = tokio::time::interval(self.probe_interval);
        probe_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        probe_timer.tick().await;

        loop {
            tokio::select! {
                changed = platform.changed() => {
                    if changed.is_err() {
                        tracing::debug!("[Network] Connectivity source closed");
                        break;
                    }
                    let state = platform.borrow_and_update().clone();
                    let mut next = Connectivity::from_state(&state);
                    if next.is_connected && next.is_internet_reachable.is_none() {
                        if let Some(reachable) = self.probe_now().await {
                            next.is_internet_reachable = Some(reachable);
                        }
                    }
                    self.apply(next);
                }
                _ = probe_timer.tick(), if self.probe.is_some() => {
                    let current = self.current();
                    if current.is_connected {
                        if let Some(reachable) = self.probe_now().await {
                            self.apply(Connectivity {
                                is_internet_reachable: Some(reachable),
                                ..current
                            });
                        }
                    }
                }
            }
        }
    }

    async fn probe_now(&self) -> Option<bool> {
        let probe = self.probe.as_ref()?;
        Some(probe.probe(self.probe_timeout).await)
    }

    /// Publish `next` if it differs from the current tuple
    fn apply(&self, next: Connectivity) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current != next {
                *current = next;
                true
            } else {
                false
            }
        });

        if changed {
            let quality = next.quality();
            tracing::info!(
                "[Network] {:?} connected={} reachable={:?} quality={:?}",
                next.connection_type,
                next.is_connected,
                next.is_internet_reachable,
                quality
            );
            self.events.emit(SyncEvent::NetworkChanged {
                connectivity: next,
                quality,
            });
        }
        changed
    }
}
