//! # Sync Scheduler
//!
//! Decides when the periodic trigger should start a drain. The interval
//! stretches on slow networks and the periodic trigger stops entirely while
//! offline; connectivity transitions and `force_sync` bypass it.

use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::sync::quality::NetworkQuality;

/// Synchronization scheduler
#[derive(Debug)]
pub struct SyncScheduler {
    /// Last finished cycle
    last_sync: RwLock<Option<Instant>>,
    /// Current interval, `None` while offline
    current_interval: RwLock<Option<Duration>>,
    /// Interval on a good connection
    base_interval: Duration,
}

impl SyncScheduler {
    /// Create a new sync scheduler
    pub fn new(base_interval: Duration) -> Self {
        Self {
            last_sync: RwLock::new(None),
            current_interval: RwLock::new(Some(base_interval)),
            base_interval,
        }
    }

    /// Check if a periodic sync is due
    pub async fn should_sync(&self) -> bool {
        let Some(interval) = *self.current_interval.read().await else {
            return false;
        };

        match *self.last_sync.read().await {
            Some(time) => time.elapsed() >= interval,
            None => true,
        }
    }

    /// Record a finished cycle
    pub async fn record_sync(&self) {
        *self.last_sync.write().await = Some(Instant::now());
    }

    /// Adjust the interval to the network quality
    pub async fn adjust_interval(&self, network_quality: NetworkQuality) {
        let interval = match network_quality {
            NetworkQuality::Excellent | NetworkQuality::Good => Some(self.base_interval),
            NetworkQuality::Fair => Some(self.base_interval * 2),
            NetworkQuality::Poor => Some(self.base_interval * 4),
            NetworkQuality::Offline => None,
        };

        let mut current = self.current_interval.write().await;
        if *current != interval {
            tracing::debug!("[Scheduler] Interval {:?} -> {:?}", *current, interval);
            *current = interval;
        }
    }

    /// Current interval, `None` while offline
    pub async fn current_interval(&self) -> Option<Duration> {
        *self.current_interval.read().await
    }
}

impl Default for SyncScheduler {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}
