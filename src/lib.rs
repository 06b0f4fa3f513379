//! Zaptap Sync - Offline Operation Queue and Sync Engine
//!
//! The local-first core of the Zaptap app: remote mutations are queued
//! durably while the device is offline and replayed in order once
//! connectivity returns.
//!
//! # Overview
//!
//! This library provides:
//! - A durable FIFO of remote mutations with retry budgets and a dead-letter
//!   queue
//! - Connectivity monitoring with a reachability probe and a derived network
//!   quality
//! - A sync engine that drains the queue on reconnect, on demand and
//!   periodically, one cycle at a time
//! - A facade exposing an aggregated snapshot and the UI-facing actions
//!
//! # Module Structure
//!
//! - **`shared`** - Types every layer uses
//!   - Error taxonomy, typed events and the event bus
//!   - Configuration (builder, TOML, environment)
//!
//! - **`offline`** - The operation queue
//!   - Operation state machine, ordering, statistics
//!   - Backoff strategies and retry deadlines
//!   - Storage seam and in-memory store
//!
//! - **`local_db`** - SQLite persistence for the queue
//!
//! - **`sync`** - Connectivity and draining
//!   - Connectivity monitor, reachability probe, quality table
//!   - Remote executors
//!   - Sync engine, scheduler, metrics
//!
//! - **`network`** - `NetworkFacade`, the presentation-layer entry point
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zaptap_sync::network::NetworkFacade;
//! use zaptap_sync::shared::{EventKind, SyncConfig, SyncEvent};
//! use zaptap_sync::sync::{ExecutorRegistry, ManualConnectivity, NetInfoState};
//!
//! # async fn example() -> zaptap_sync::Result<()> {
//! let source = Arc::new(ManualConnectivity::new(NetInfoState::wifi()));
//! let executor = Arc::new(
//!     ExecutorRegistry::new().with("run-automation", |payload| async move {
//!         println!("running {}", payload);
//!         Ok(())
//!     }),
//! );
//!
//! let network = NetworkFacade::open(SyncConfig::default(), source.clone(), executor).await?;
//! network.on(EventKind::SyncCompleted, |event| {
//!     if let SyncEvent::SyncCompleted { progress, .. } = event {
//!         println!("synced {}/{}", progress.completed, progress.total);
//!     }
//! });
//!
//! network.enqueue("run-automation", serde_json::json!({ "id": "abc" })).await?;
//!
//! // The host app forwards platform connectivity reports
//! source.set(NetInfoState::disconnected());
//! source.set(NetInfoState::wifi());
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! All components are `Send + Sync` and shared through `Arc`. Queue state is
//! guarded by a `tokio::sync::Mutex`; a drain cycle runs on its own task and
//! completes even if the caller that triggered it goes away.
//!
//! # Error Handling
//!
//! - `SyncError` for queue and cycle-level failures (`shared::error`)
//! - `ExecutionError` for a single remote attempt; contained in the drain
//!   loop and recorded on the operation
//! - `ConfigError` for configuration loading

/// Shared types and data structures
pub mod shared;

/// Offline operation queue
pub mod offline;

/// SQLite persistence
pub mod local_db;

/// Connectivity monitoring and the sync engine
pub mod sync;

/// Presentation-layer facade
pub mod network;

pub use network::NetworkFacade;
pub use offline::{Operation, OperationId, OperationKind, OperationQueue, OperationState};
pub use shared::error::{ExecutionError, Result, SyncError};
pub use sync::{NetworkSnapshot, SyncEngine, SyncProgress};
