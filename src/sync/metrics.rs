//! # Sync Metrics
//!
//! Cumulative counters over every drain cycle the engine has run.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncMetrics {
    pub total_syncs: u64,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    pub operations_completed: u64,
    pub operations_failed: u64,
    pub operations_dead_lettered: u64,
    pub average_sync_duration: Duration,
    pub last_sync_duration: Option<Duration>,
    last_sync_start: Option<Instant>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sync_start(&mut self) {
        self.last_sync_start = Some(Instant::now());
        self.total_syncs += 1;
    }

    pub fn record_operation(&mut self, succeeded: bool, dead_lettered: bool) {
        if succeeded {
            self.operations_completed += 1;
        } else {
            self.operations_failed += 1;
            if dead_lettered {
                self.operations_dead_lettered += 1;
            }
        }
    }

    pub fn record_sync_success(&mut self) {
        if let Some(start) = self.last_sync_start.take() {
            let duration = start.elapsed();
            self.last_sync_duration = Some(duration);
            self.successful_syncs += 1;

            // Rolling average over successful cycles
            let total_duration = self.average_sync_duration * (self.successful_syncs - 1) as u32 + duration;
            self.average_sync_duration = total_duration / self.successful_syncs as u32;
        }
    }

    pub fn record_sync_failure(&mut self) {
        if let Some(start) = self.last_sync_start.take() {
            self.last_sync_duration = Some(start.elapsed());
        }
        self.failed_syncs += 1;
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_syncs == 0 {
            0.0
        } else {
            self.successful_syncs as f64 / self.total_syncs as f64
        }
    }
}
