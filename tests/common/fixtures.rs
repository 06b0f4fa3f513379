//! Executor and facade fixtures
//!
//! `ScriptedExecutor` decides each attempt's outcome from the payload's
//! `name` field, so scenarios can say "B fails once, then succeeds".

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use zaptap_sync::network::NetworkFacade;
use zaptap_sync::offline::{BackoffStrategy, MemoryStore, PersistentStore};
use zaptap_sync::shared::{EventKind, SyncConfig, SyncEvent};
use zaptap_sync::sync::{ManualConnectivity, NetInfoState, RemoteExecutor};
use zaptap_sync::{ExecutionError, OperationId, OperationKind};

/// Install a test subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config with no backoff delay and no periodic trigger during a test
pub fn test_config(max_attempts: u32) -> SyncConfig {
    test_config_with_backoff(max_attempts, BackoffStrategy::immediate())
}

pub fn test_config_with_backoff(max_attempts: u32, backoff: BackoffStrategy) -> SyncConfig {
    SyncConfig::builder()
        .max_attempts(max_attempts)
        .backoff(backoff)
        .sync_interval(Duration::from_secs(3600))
        .build()
        .expect("valid test config")
}

/// Payload naming an operation for `ScriptedExecutor`
pub fn named(name: &str) -> Value {
    json!({ "name": name })
}

/// Executor whose outcomes are scripted per operation name
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, VecDeque<Result<(), ExecutionError>>>>,
    fallback: Mutex<HashMap<String, Result<(), ExecutionError>>>,
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every attempt sleeps for `delay` first
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    /// Outcomes for the next attempts of `name`, in order
    pub fn script(&self, name: &str, outcomes: impl IntoIterator<Item = Result<(), ExecutionError>>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .extend(outcomes);
    }

    /// Outcome once the script for `name` is used up (default `Ok`)
    pub fn always(&self, name: &str, outcome: Result<(), ExecutionError>) {
        self.fallback.lock().unwrap().insert(name.to_string(), outcome);
    }

    /// Operation names in execution order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == name).count()
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn execute(&self, _kind: &OperationKind, payload: &Value) -> Result<(), ExecutionError> {
        let name = payload["name"].as_str().unwrap_or_default().to_string();
        self.calls.lock().unwrap().push(name.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&name)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(outcome) => outcome,
            None => self
                .fallback
                .lock()
                .unwrap()
                .get(&name)
                .cloned()
                .unwrap_or(Ok(())),
        }
    }
}

/// Every event a facade emitted, in order
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<SyncEvent>>>,
}

impl EventRecorder {
    pub fn attach(network: &NetworkFacade) -> Self {
        let recorder = Self::default();
        for kind in [
            EventKind::NetworkChanged,
            EventKind::SyncStarted,
            EventKind::SyncProgress,
            EventKind::SyncCompleted,
            EventKind::SyncFailed,
            EventKind::OperationCompleted,
            EventKind::OperationFailed,
        ] {
            let events = Arc::clone(&recorder.events);
            network.on(kind, move |event| events.lock().unwrap().push(event.clone()));
        }
        recorder
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(SyncEvent::kind).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }
}

/// Facade over a scripted executor and a manual connectivity source
pub struct Harness {
    pub network: NetworkFacade,
    pub source: Arc<ManualConnectivity>,
    pub executor: Arc<ScriptedExecutor>,
    pub recorder: EventRecorder,
}

impl Harness {
    pub async fn start(config: SyncConfig, executor: Arc<ScriptedExecutor>) -> Self {
        Self::start_with(config, executor, NetInfoState::wifi(), Arc::new(MemoryStore::new())).await
    }

    pub async fn start_with(
        config: SyncConfig,
        executor: Arc<ScriptedExecutor>,
        initial: NetInfoState,
        store: Arc<dyn PersistentStore>,
    ) -> Self {
        init_tracing();
        let source = Arc::new(ManualConnectivity::new(initial));
        let network = NetworkFacade::start(config, source.clone(), None, executor.clone(), store)
            .await
            .expect("facade starts");
        let recorder = EventRecorder::attach(&network);
        Self {
            network,
            source,
            executor,
            recorder,
        }
    }

    /// Enqueue an operation named for the scripted executor
    pub async fn enqueue(&self, name: &str) -> OperationId {
        self.network
            .enqueue("test-op", named(name))
            .await
            .expect("enqueue succeeds")
    }
}
