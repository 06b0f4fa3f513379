//! # Operation Queue
//!
//! Durable FIFO of pending mutation records destined for the remote API.
//!
//! ## Features
//!
//! - **Persistent Queue**: Every mutation goes through a `PersistentStore`
//!   before it is visible in memory, so operations survive app restarts
//! - **Status Tracking**: `pending → in_flight → completed | failed → dead_letter`
//! - **FIFO Claims**: Operations are claimed in insertion order; a dead-letter
//!   requeue goes to the current tail
//! - **Cleanup**: Completed operations are removed only on request
//!
//! ## Usage
//!
//! ```rust,no_run
//! use zaptap_sync::offline::queue::OperationQueue;
//!
//! # async fn example() -> zaptap_sync::Result<()> {
//! let queue = OperationQueue::in_memory(5);
//! let id = queue.enqueue("create-automation", serde_json::json!({ "name": "Morning" })).await?;
//!
//! if let Some(op) = queue.dequeue_next_pending().await? {
//!     // Execute operation...
//!     queue.mark_completed(&op.id).await?;
//! }
//! assert_eq!(queue.clear_completed().await?, 1);
//! # let _ = id;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::offline::store::{MemoryStore, PersistentStore};
use crate::shared::error::{Result, SyncError};

/// Opaque, unique operation identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Generate a fresh id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Tag naming the remote action an operation replays
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationKind(String);

impl OperationKind {
    /// Create a kind tag such as `create-automation`
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    /// The tag as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationKind {
    fn from(kind: &str) -> Self {
        Self::new(kind)
    }
}

impl From<String> for OperationKind {
    fn from(kind: String) -> Self {
        Self(kind)
    }
}

/// Operation execution status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// Waiting to be executed
    Pending,
    /// Claimed by a drain cycle
    InFlight,
    /// Successfully completed
    Completed,
    /// Failed, will be retried
    Failed,
    /// Attempt budget exhausted, waits for an explicit requeue
    DeadLetter,
}

impl OperationState {
    /// Stable string form, used in storage and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::DeadLetter => "dead_letter",
        }
    }

    /// No further automatic attempts are made from this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::DeadLetter)
    }

    /// The operation still waits to be (re-)executed
    pub fn is_awaiting_execution(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationState {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_flight" => Ok(Self::InFlight),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "dead_letter" => Ok(Self::DeadLetter),
            other => Err(SyncError::storage(format!("unknown operation state '{}'", other))),
        }
    }
}

/// A queued, replayable remote mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Unique id
    pub id: OperationId,
    /// Insertion order; a dead-letter requeue assigns a new tail value
    pub seq: u64,
    /// Remote action tag
    pub kind: OperationKind,
    /// Data needed to replay the action
    pub payload: serde_json::Value,
    /// Current state
    pub state: OperationState,
    /// Failed attempts so far
    pub attempts: u32,
    /// When the operation was enqueued
    pub created_at: DateTime<Utc>,
    /// When the operation was last claimed
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Reason of the last failure (failed / dead_letter only)
    pub last_error: Option<String>,
}

impl Operation {
    /// Create a fresh pending operation
    pub fn new(seq: u64, kind: OperationKind, payload: serde_json::Value) -> Self {
        Self {
            id: OperationId::new(),
            seq,
            kind,
            payload,
            state: OperationState::Pending,
            attempts: 0,
            created_at: Utc::now(),
            last_attempt_at: None,
            last_error: None,
        }
    }
}

/// Counts by state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Waiting for a first attempt
    pub pending: usize,
    /// Claimed by a running cycle
    pub in_flight: usize,
    /// Successfully completed, not yet cleared
    pub completed: usize,
    /// Failed, will be retried
    pub failed: usize,
    /// Attempt budget exhausted
    pub dead_letter: usize,
}

impl QueueStats {
    /// Total operations in queue
    pub fn total(&self) -> usize {
        self.pending + self.in_flight + self.completed + self.failed + self.dead_letter
    }
}

#[derive(Debug, Default)]
struct QueueState {
    /// Sorted by `seq`
    operations: Vec<Operation>,
    next_seq: u64,
}

impl QueueState {
    fn position(&self, id: &OperationId) -> Option<usize> {
        self.operations.iter().position(|op| op.id == *id)
    }
}

/// Operation queue for offline operations
#[derive(Debug)]
pub struct OperationQueue {
    store: Arc<dyn PersistentStore>,
    max_attempts: u32,
    state: Mutex<QueueState>,
}

impl OperationQueue {
    /// Load the queue from a store
    ///
    /// Operations left `in_flight` by a previous process go back to
    /// `pending`; their outcome is unknown, so no attempt is counted.
    pub async fn open(store: Arc<dyn PersistentStore>, max_attempts: u32) -> Result<Self> {
        let mut operations = store.load().await?;
        operations.sort_by_key(|op| op.seq);

        for op in operations.iter_mut().filter(|op| op.state == OperationState::InFlight) {
            tracing::warn!("[Queue] Recovering interrupted operation {} ({})", op.id, op.kind);
            op.state = OperationState::Pending;
            store.upsert(op).await?;
        }

        let next_seq = operations.last().map_or(1, |op| op.seq + 1);
        tracing::info!("[Queue] Loaded {} operations", operations.len());

        Ok(Self {
            store,
            max_attempts,
            state: Mutex::new(QueueState {
                operations,
                next_seq,
            }),
        })
    }

    /// Empty queue over a fresh `MemoryStore`
    pub fn in_memory(max_attempts: u32) -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            max_attempts,
            state: Mutex::new(QueueState {
                operations: Vec::new(),
                next_seq: 1,
            }),
        }
    }

    /// Attempts before an operation is dead-lettered
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Last completed sync time remembered by the store
    pub async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.store.load_last_sync_time().await
    }

    /// Persist the completion time of a sync cycle
    pub async fn record_sync_time(&self, at: DateTime<Utc>) -> Result<()> {
        self.store.save_last_sync_time(at).await
    }

    /// Append a new pending operation at the tail
    pub async fn enqueue(
        &self,
        kind: impl Into<OperationKind>,
        payload: serde_json::Value,
    ) -> Result<OperationId> {
        let mut state = self.state.lock().await;
        let op = Operation::new(state.next_seq, kind.into(), payload);

        self.store.upsert(&op).await?;

        let id = op.id;
        tracing::debug!("[Queue] Enqueued {} ({}) seq={}", id, op.kind, op.seq);
        state.next_seq += 1;
        state.operations.push(op);
        Ok(id)
    }

    /// Claim the oldest operation awaiting execution
    ///
    /// Returns `pending` and `failed` operations; dead-lettered ones are
    /// skipped until requeued.
    pub async fn dequeue_next_pending(&self) -> Result<Option<Operation>> {
        self.dequeue_next_eligible(|_| true).await
    }

    /// Claim the oldest awaiting operation accepted by `is_eligible`
    pub async fn dequeue_next_eligible<F>(&self, is_eligible: F) -> Result<Option<Operation>>
    where
        F: Fn(&Operation) -> bool,
    {
        let mut state = self.state.lock().await;
        let Some(index) = state
            .operations
            .iter()
            .position(|op| op.state.is_awaiting_execution() && is_eligible(op))
        else {
            return Ok(None);
        };

        let mut claimed = state.operations[index].clone();
        claimed.state = OperationState::InFlight;
        claimed.last_attempt_at = Some(Utc::now());
        self.store.upsert(&claimed).await?;

        state.operations[index] = claimed.clone();
        Ok(Some(claimed))
    }

    /// `in_flight → completed`
    pub async fn mark_completed(&self, id: &OperationId) -> Result<()> {
        self.update(id, |op| {
            Self::require_in_flight(op, OperationState::Completed)?;
            op.state = OperationState::Completed;
            op.last_error = None;
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// `in_flight → failed`, or `dead_letter` once the budget is used up
    ///
    /// Returns the state the operation ended in.
    pub async fn mark_failed(&self, id: &OperationId, error: impl Into<String>) -> Result<OperationState> {
        let error = error.into();
        let max_attempts = self.max_attempts;
        let op = self
            .update(id, |op| {
                Self::require_in_flight(op, OperationState::Failed)?;
                op.attempts = op.attempts.saturating_add(1);
                op.state = if op.attempts >= max_attempts {
                    OperationState::DeadLetter
                } else {
                    OperationState::Failed
                };
                op.last_error = Some(error);
                Ok(())
            })
            .await?;

        if op.state == OperationState::DeadLetter {
            tracing::warn!(
                "[Queue] Operation {} ({}) dead-lettered after {} attempts",
                op.id,
                op.kind,
                op.attempts
            );
        }
        Ok(op.state)
    }

    /// Return an `in_flight` operation to the state it was claimed from
    ///
    /// For attempts whose outcome could not be stored. The in-memory record
    /// always reverts so the operation stays claimable; a stored `in_flight`
    /// record left behind is recovered on the next open. Returns `false` if
    /// the operation was not in flight.
    pub async fn release_claim(&self, id: &OperationId) -> bool {
        let mut state = self.state.lock().await;
        let Some(index) = state.position(id) else {
            return false;
        };
        let op = &mut state.operations[index];
        if op.state != OperationState::InFlight {
            return false;
        }

        op.state = if op.attempts > 0 {
            OperationState::Failed
        } else {
            OperationState::Pending
        };
        tracing::warn!("[Queue] Released claim on {} ({}) as {}", op.id, op.kind, op.state);
        if let Err(e) = self.store.upsert(op).await {
            tracing::warn!("[Queue] Released state of {} not persisted: {}", op.id, e);
        }
        true
    }

    /// Snapshot of all dead-lettered operations, oldest first
    pub async fn get_dead_letter_queue(&self) -> Vec<Operation> {
        self.operations_in(OperationState::DeadLetter).await
    }

    /// Move one operation from `dead_letter` back to `pending` at the tail
    ///
    /// Returns `false` (and changes nothing) if the operation is not
    /// currently dead-lettered.
    pub async fn requeue_from_dead_letter(&self, id: &OperationId) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(index) = state.position(id) else {
            return Ok(false);
        };
        if state.operations[index].state != OperationState::DeadLetter {
            return Ok(false);
        }

        let mut requeued = state.operations[index].clone();
        requeued.state = OperationState::Pending;
        requeued.attempts = 0;
        requeued.last_error = None;
        requeued.seq = state.next_seq;
        self.store.upsert(&requeued).await?;

        tracing::info!("[Queue] Requeued {} ({}) from dead letter", requeued.id, requeued.kind);
        state.next_seq += 1;
        state.operations.remove(index);
        state.operations.push(requeued);
        Ok(true)
    }

    /// Remove all completed operations, returning how many were removed
    pub async fn clear_completed(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        let completed: Vec<OperationId> = state
            .operations
            .iter()
            .filter(|op| op.state == OperationState::Completed)
            .map(|op| op.id)
            .collect();
        if completed.is_empty() {
            return Ok(0);
        }

        self.store.remove(&completed).await?;
        state
            .operations
            .retain(|op| op.state != OperationState::Completed);

        tracing::debug!("[Queue] Cleared {} completed operations", completed.len());
        Ok(completed.len())
    }

    /// Get operation statistics
    pub async fn get_stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        let mut stats = QueueStats::default();
        for op in state.operations.iter() {
            match op.state {
                OperationState::Pending => stats.pending += 1,
                OperationState::InFlight => stats.in_flight += 1,
                OperationState::Completed => stats.completed += 1,
                OperationState::Failed => stats.failed += 1,
                OperationState::DeadLetter => stats.dead_letter += 1,
            }
        }
        stats
    }

    /// Current copy of one operation
    pub async fn get(&self, id: &OperationId) -> Option<Operation> {
        let state = self.state.lock().await;
        state.position(id).map(|i| state.operations[i].clone())
    }

    /// All operations in queue order
    pub async fn operations(&self) -> Vec<Operation> {
        self.state.lock().await.operations.clone()
    }

    /// Operations in one state, in queue order
    pub async fn operations_in(&self, wanted: OperationState) -> Vec<Operation> {
        let state = self.state.lock().await;
        state
            .operations
            .iter()
            .filter(|op| op.state == wanted)
            .cloned()
            .collect()
    }

    /// Apply `change` to a copy, persist it, then commit it
    async fn update<F>(&self, id: &OperationId, change: F) -> Result<Operation>
    where
        F: FnOnce(&mut Operation) -> Result<()>,
    {
        let mut state = self.state.lock().await;
        let index = state.position(id).ok_or_else(|| SyncError::not_found(id))?;

        let mut updated = state.operations[index].clone();
        change(&mut updated)?;
        self.store.upsert(&updated).await?;

        state.operations[index] = updated.clone();
        Ok(updated)
    }

    fn require_in_flight(op: &Operation, to: OperationState) -> Result<()> {
        if op.state == OperationState::InFlight {
            Ok(())
        } else {
            Err(SyncError::invalid_transition(op.id, op.state, to))
        }
    }
}
