//! Shared Module
//!
//! Types used by every layer of the sync core: errors, events and
//! configuration.

/// Sync event system
pub mod event;

/// Shared error types
pub mod error;

/// Sync configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use config::{ConfigError, SyncConfig, SyncConfigBuilder};
pub use error::{ExecutionError, SyncError};
pub use event::{EventBus, EventKind, ListenerId, SyncEvent};
