//! # Sync State Management
//!
//! Progress of the running drain cycle and the aggregated snapshot the
//! presentation layer reads.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::offline::queue::{OperationId, QueueStats};
use crate::sync::network_monitor::{ConnectionType, Connectivity};
use crate::sync::quality::NetworkQuality;

/// Running totals of one drain cycle
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncProgress {
    /// Distinct operations claimed in the cycle
    pub total: usize,
    /// Operations whose latest attempt succeeded
    pub completed: usize,
    /// Operations whose latest attempt failed
    pub failed: usize,
    /// Whether a cycle is still running
    pub in_progress: bool,
}

/// Immutable read model of connectivity and sync status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSnapshot {
    /// Connected and not known to be unreachable
    pub is_online: bool,
    /// Link-layer connection reported by the platform
    pub is_connected: bool,
    /// Transport of the active interface
    pub connection_type: ConnectionType,
    /// `None` until the platform or the probe has an answer
    pub is_internet_reachable: Option<bool>,
    /// Derived from the transport and reachability
    pub network_quality: NetworkQuality,
    /// Whether a drain cycle is running
    pub is_syncing: bool,
    /// Running totals, zero baseline between cycles
    pub sync_progress: SyncProgress,
    /// Completion time of the last cycle that finished cleanly
    pub last_sync_time: Option<DateTime<Utc>>,
    /// `pending` + `in_flight`
    pub pending_operations: usize,
    /// `failed` + `dead_letter`
    pub failed_operations: usize,
}

impl NetworkSnapshot {
    /// Combine the monitor's view, queue counts and cycle progress
    pub fn new(
        connectivity: &Connectivity,
        stats: &QueueStats,
        progress: SyncProgress,
        last_sync_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            is_online: connectivity.is_online(),
            is_connected: connectivity.is_connected,
            connection_type: connectivity.connection_type,
            is_internet_reachable: connectivity.is_internet_reachable,
            network_quality: connectivity.quality(),
            is_syncing: progress.in_progress,
            sync_progress: progress,
            last_sync_time,
            pending_operations: stats.pending + stats.in_flight,
            failed_operations: stats.failed + stats.dead_letter,
        }
    }
}

impl Default for NetworkSnapshot {
    fn default() -> Self {
        Self::new(
            &Connectivity::offline(),
            &QueueStats::default(),
            SyncProgress::default(),
            None,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Failed,
}

/// Latest outcome per operation within one cycle
#[derive(Debug, Default)]
pub(crate) struct CycleTally {
    outcomes: HashMap<OperationId, Outcome>,
}

impl CycleTally {
    pub(crate) fn record(&mut self, id: OperationId, succeeded: bool) {
        let outcome = if succeeded {
            Outcome::Completed
        } else {
            Outcome::Failed
        };
        self.outcomes.insert(id, outcome);
    }

    pub(crate) fn progress(&self, in_progress: bool) -> SyncProgress {
        let completed = self
            .outcomes
            .values()
            .filter(|o| **o == Outcome::Completed)
            .count();
        SyncProgress {
            total: self.outcomes.len(),
            completed,
            failed: self.outcomes.len() - completed,
            in_progress,
        }
    }
}
