//! # Retry Logic and Backoff Strategies
//!
//! Decides how long a failed operation waits before the engine claims it
//! again, and when an operation has used up its attempt budget.
//!
//! ## Features
//!
//! - **Exponential Backoff**: Gradually increase retry intervals
//! - **Jitter**: Add randomness to prevent thundering herd
//! - **Max Attempts**: Past the budget an operation is dead-lettered
//!
//! Backoff is advisory. Deadlines live in `RetryManager` memory only; the
//! queue never stores them, so after a restart every failed operation is
//! immediately eligible.
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//! use zaptap_sync::offline::retry::{BackoffStrategy, RetryPolicy};
//!
//! let policy = RetryPolicy::new(3, BackoffStrategy::Exponential {
//!     base: Duration::from_secs(1),
//!     max: Duration::from_secs(60),
//!     jitter: 0.0,
//! });
//! assert_eq!(policy.backoff(3), Duration::from_secs(4));
//! assert!(policy.is_exhausted(3));
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::offline::queue::OperationId;

/// Backoff strategy configuration
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Fixed interval between retries
    Fixed {
        /// Delay after every failure
        interval: Duration,
    },
    /// Exponential backoff with jitter
    Exponential {
        /// Delay after the first failure
        base: Duration,
        /// Upper bound before jitter
        max: Duration,
        /// Jitter factor (0.0 to 1.0)
        jitter: f64,
    },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(300), // 5 minutes
            jitter: 0.1,
        }
    }
}

impl BackoffStrategy {
    /// No delay between attempts
    pub fn immediate() -> Self {
        Self::Fixed {
            interval: Duration::ZERO,
        }
    }

    /// Delay to wait after the given number of failed attempts
    pub fn delay(&self, attempts: u32) -> Duration {
        match self {
            Self::Fixed { interval } => *interval,
            Self::Exponential { base, max, jitter } => {
                if attempts == 0 {
                    return Duration::ZERO;
                }
                let factor = 2u32.saturating_pow(attempts - 1);
                let delay = base.saturating_mul(factor).min(*max);

                let jitter = jitter.clamp(0.0, 1.0);
                if jitter == 0.0 || delay.is_zero() {
                    return delay;
                }
                delay + delay.mul_f64(jitter * rand::random::<f64>())
            }
        }
    }
}

/// Attempt budget plus backoff curve
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts before an operation is dead-lettered
    pub max_attempts: u32,
    /// Delay curve between attempts
    pub strategy: BackoffStrategy,
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(max_attempts: u32, strategy: BackoffStrategy) -> Self {
        Self {
            max_attempts,
            strategy,
        }
    }

    /// Delay before the next claim after `attempts` failures
    pub fn backoff(&self, attempts: u32) -> Duration {
        self.strategy.delay(attempts)
    }

    /// Whether `attempts` failures use up the budget
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, BackoffStrategy::default())
    }
}

/// Tracks when failed operations become eligible again
///
/// Deadlines sit behind a synchronous lock so claim predicates, which
/// cannot await, can consult them directly.
#[derive(Debug)]
pub struct RetryManager {
    policy: RetryPolicy,
    deadlines: Mutex<HashMap<OperationId, Instant>>,
}

impl RetryManager {
    /// Create a new retry manager
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            deadlines: Mutex::new(HashMap::new()),
        }
    }

    fn deadlines(&self) -> MutexGuard<'_, HashMap<OperationId, Instant>> {
        self.deadlines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a failure and return the instant the operation becomes eligible
    pub fn schedule_retry(&self, id: OperationId, attempts: u32) -> Instant {
        let ready_at = Instant::now() + self.policy.backoff(attempts);
        self.deadlines().insert(id, ready_at);
        ready_at
    }

    /// Drop the deadline for an operation that settled or was requeued
    pub fn cancel_retry(&self, id: &OperationId) {
        self.deadlines().remove(id);
    }

    /// Whether a failed operation may be claimed at `now`
    pub fn is_ready(&self, id: &OperationId, now: Instant) -> bool {
        self.deadlines()
            .get(id)
            .map_or(true, |ready_at| now >= *ready_at)
    }
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
