//! # Offline Operation System
//!
//! Queues remote mutations while the device is offline (or while a sync is
//! already running) and tracks them until they complete or exhaust their
//! retry budget.
//!
//! ## Key Components
//!
//! - `queue.rs`: Durable FIFO of operations and their state machine
//! - `retry.rs`: Backoff strategies and advisory retry deadlines
//! - `store.rs`: Storage seam (`PersistentStore`) and the in-memory store
//!
//! The durable SQLite store lives in `crate::local_db`.

pub mod queue;
pub mod retry;
pub mod store;

// Re-export main types
pub use queue::{Operation, OperationId, OperationKind, OperationQueue, OperationState, QueueStats};
pub use retry::{BackoffStrategy, RetryManager, RetryPolicy};
pub use store::{MemoryStore, PersistentStore};
