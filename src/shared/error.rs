//! Shared Error Types
//!
//! Error types used across the queue, the sync engine and the facade.
//!
//! # Error Categories
//!
//! - `SyncError` - failures that reach the caller of a queue mutation or of
//!   `force_sync` (storage unavailable, offline, connection lost)
//! - `ExecutionError` - a single operation failed against the remote API.
//!   These never leave the drain loop; they are recorded on the operation.
//!
//! # Usage
//!
//! ```rust
//! use zaptap_sync::shared::error::SyncError;
//!
//! let error = SyncError::storage("disk full");
//! assert!(error.to_string().contains("disk full"));
//! ```
//!
//! # Thread Safety
//!
//! All error types are `Send + Sync + Clone`, so one cycle outcome can be
//! handed to every caller waiting on it.
use std::time::Duration;

use thiserror::Error;

use crate::shared::config::ConfigError;

/// Result alias for queue and engine operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors surfaced by the queue, the engine and the facade
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The persistent store rejected a read or a write
    #[error("Storage error: {message}")]
    Storage {
        /// Human-readable error message
        message: String,
    },

    /// A sync was requested while the connectivity check failed
    #[error("Offline: connectivity check failed, no operations attempted")]
    Offline,

    /// Connectivity dropped while a drain cycle was running
    #[error("Connection lost during sync: {message}")]
    ConnectionLost {
        /// Failure reported by the operation that observed the loss
        message: String,
    },

    /// No operation with this id exists in the queue
    #[error("Operation not found: {id}")]
    NotFound {
        /// The missing operation id
        id: String,
    },

    /// A state transition was requested from the wrong state
    #[error("Operation {id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Operation id
        id: String,
        /// Current state
        from: String,
        /// Requested state
        to: String,
    },

    /// Configuration was rejected
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable error message
        message: String,
    },
}

impl SyncError {
    /// Create a new storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a new connection-lost error
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::ConnectionLost {
            message: message.into(),
        }
    }

    /// Create a new not-found error
    pub fn not_found(id: impl ToString) -> Self {
        Self::NotFound { id: id.to_string() }
    }

    /// Create a new invalid-transition error
    pub fn invalid_transition(id: impl ToString, from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Whether this error ends a cycle because the network is unavailable
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline | Self::ConnectionLost { .. })
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        Self::storage(format!("SQLite error: {}", err))
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::storage(format!("JSON error: {}", err))
    }
}

impl From<ConfigError> for SyncError {
    fn from(err: ConfigError) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}

/// Failure of a single remote execution
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The request never reached the remote side
    #[error("Network error: {0}")]
    Network(String),

    /// The executor did not finish within the operation timeout
    #[error("Timed out after {}ms", after.as_millis())]
    Timeout {
        /// The timeout that elapsed
        after: Duration,
    },

    /// The remote side answered with an error
    #[error("Rejected ({status}): {message}")]
    Rejected {
        /// HTTP-like status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// No handler is registered for the operation kind
    #[error("No executor registered for kind '{0}'")]
    UnsupportedKind(String),

    /// Anything else the executor reports
    #[error("{0}")]
    Other(String),
}

impl ExecutionError {
    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Create a generic execution error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Whether the failure means connectivity went away
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}
