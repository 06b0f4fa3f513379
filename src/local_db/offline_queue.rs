//! # Offline Queue Rows
//!
//! Maps `Operation` records and sync metadata onto SQLite rows and provides
//! the `PersistentStore` implementation for `SqliteStore`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::local_db::SqliteStore;
use crate::offline::queue::{Operation, OperationId, OperationKind, OperationState};
use crate::offline::store::PersistentStore;
use crate::shared::error::{Result, SyncError};

const LAST_SYNC_TIME_KEY: &str = "last_sync_time";

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SyncError::storage(format!("bad timestamp '{}': {}", value, e)))
}

fn operation_from_row(row: &SqliteRow) -> Result<Operation> {
    let id: String = row.try_get("id")?;
    let seq: i64 = row.try_get("seq")?;
    let kind: String = row.try_get("kind")?;
    let payload: String = row.try_get("payload")?;
    let state: String = row.try_get("state")?;
    let attempts: i64 = row.try_get("attempts")?;
    let created_at: String = row.try_get("created_at")?;
    let last_attempt_at: Option<String> = row.try_get("last_attempt_at")?;

    Ok(Operation {
        id: id
            .parse::<OperationId>()
            .map_err(|e| SyncError::storage(format!("bad operation id '{}': {}", id, e)))?,
        seq: seq as u64,
        kind: OperationKind::new(kind),
        payload: serde_json::from_str(&payload)?,
        state: state.parse::<OperationState>()?,
        attempts: attempts as u32,
        created_at: parse_time(&created_at)?,
        last_attempt_at: last_attempt_at.as_deref().map(parse_time).transpose()?,
        last_error: row.try_get("last_error")?,
    })
}

impl SqliteStore {
    /// Set sync metadata
    pub async fn set_sync_metadata(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO sync_metadata (key, value, updated_at)
             VALUES (?, ?, ?)",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Get sync metadata
    pub async fn get_sync_metadata(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM sync_metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool())
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PersistentStore for SqliteStore {
    async fn load(&self) -> Result<Vec<Operation>> {
        let rows = sqlx::query(
            "SELECT id, seq, kind, payload, state, attempts, created_at, last_attempt_at, last_error
             FROM offline_queue
             ORDER BY seq ASC",
        )
        .fetch_all(self.pool())
        .await?;

        let mut operations = Vec::with_capacity(rows.len());
        for row in rows {
            match operation_from_row(&row) {
                Ok(op) => operations.push(op),
                Err(e) => {
                    // Skip malformed rows rather than refusing to start
                    tracing::warn!("[LocalDb] Skipping unreadable queue row: {}", e);
                }
            }
        }
        Ok(operations)
    }

    async fn upsert(&self, operation: &Operation) -> Result<()> {
        let payload = serde_json::to_string(&operation.payload)?;

        sqlx::query(
            "INSERT INTO offline_queue
                (id, seq, kind, payload, state, attempts, created_at, last_attempt_at, last_error)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                seq = excluded.seq,
                kind = excluded.kind,
                payload = excluded.payload,
                state = excluded.state,
                attempts = excluded.attempts,
                last_attempt_at = excluded.last_attempt_at,
                last_error = excluded.last_error",
        )
        .bind(operation.id.to_string())
        .bind(operation.seq as i64)
        .bind(operation.kind.as_str())
        .bind(payload)
        .bind(operation.state.as_str())
        .bind(operation.attempts as i64)
        .bind(operation.created_at.to_rfc3339())
        .bind(operation.last_attempt_at.map(|t| t.to_rfc3339()))
        .bind(operation.last_error.as_deref())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn remove(&self, ids: &[OperationId]) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        for id in ids {
            sqlx::query("DELETE FROM offline_queue WHERE id = ?")
                .bind(id.to_string())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load_last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.get_sync_metadata(LAST_SYNC_TIME_KEY)
            .await?
            .as_deref()
            .map(parse_time)
            .transpose()
    }

    async fn save_last_sync_time(&self, at: DateTime<Utc>) -> Result<()> {
        self.set_sync_metadata(LAST_SYNC_TIME_KEY, &at.to_rfc3339()).await
    }
}
