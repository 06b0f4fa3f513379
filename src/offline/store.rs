//! # Persistent Store
//!
//! Storage seam behind the operation queue. The queue treats the store as
//! the source of truth: a change is committed in memory only after the store
//! accepted it.
//!
//! Implementations:
//! - `MemoryStore` (this module): process-local, for tests and ephemeral use
//! - `SqliteStore` (`crate::local_db`): durable across restarts

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::offline::queue::{Operation, OperationId};
use crate::shared::error::{Result, SyncError};

/// Durable storage for operation records
#[async_trait]
pub trait PersistentStore: Send + Sync + std::fmt::Debug {
    /// Load every stored operation, in any order
    async fn load(&self) -> Result<Vec<Operation>>;

    /// Insert or replace one operation
    async fn upsert(&self, operation: &Operation) -> Result<()>;

    /// Delete operations by id; unknown ids are ignored
    async fn remove(&self, ids: &[OperationId]) -> Result<()>;

    /// Time of the last completed sync cycle, if the store keeps one
    async fn load_last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(None)
    }

    /// Remember the time of the last completed sync cycle
    async fn save_last_sync_time(&self, _at: DateTime<Utc>) -> Result<()> {
        Ok(())
    }
}

/// In-memory store
///
/// Can be switched "unavailable" to exercise storage failure paths.
#[derive(Debug)]
pub struct MemoryStore {
    records: RwLock<HashMap<OperationId, Operation>>,
    last_sync_time: RwLock<Option<DateTime<Utc>>>,
    available: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            last_sync_time: RwLock::new(None),
            available: AtomicBool::new(true),
        }
    }

    /// Create a store pre-filled with records
    pub fn with_operations(operations: impl IntoIterator<Item = Operation>) -> Self {
        let records = operations.into_iter().map(|op| (op.id, op)).collect();
        Self {
            records: RwLock::new(records),
            last_sync_time: RwLock::new(None),
            available: AtomicBool::new(true),
        }
    }

    /// Make every subsequent call fail (or succeed again)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store holds no records
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Stored copy of one record
    pub async fn get(&self, id: &OperationId) -> Option<Operation> {
        self.records.read().await.get(id).cloned()
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::storage("memory store unavailable"))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn load(&self) -> Result<Vec<Operation>> {
        self.check_available()?;
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn upsert(&self, operation: &Operation) -> Result<()> {
        self.check_available()?;
        self.records
            .write()
            .await
            .insert(operation.id, operation.clone());
        Ok(())
    }

    async fn remove(&self, ids: &[OperationId]) -> Result<()> {
        self.check_available()?;
        let mut records = self.records.write().await;
        for id in ids {
            records.remove(id);
        }
        Ok(())
    }

    async fn load_last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.check_available()?;
        Ok(*self.last_sync_time.read().await)
    }

    async fn save_last_sync_time(&self, at: DateTime<Utc>) -> Result<()> {
        self.check_available()?;
        *self.last_sync_time.write().await = Some(at);
        Ok(())
    }
}
