//! # Local Database Module
//!
//! Durable SQLite storage for the offline operation queue.
//!
//! ## Architecture
//!
//! - **Offline Queue**: one row per operation, keyed by id, ordered by `seq`
//! - **Sync Metadata**: key/value rows (last completed sync time)
//! - **Migrations**: versioned in `schema_migrations`, see `schema.rs`
//!
//! ## Key Components
//!
//! - `SqliteStore`: connection pool, schema management, `PersistentStore` impl
//! - `schema.rs`: schema versions and migration SQL
//! - `offline_queue.rs`: row mapping for operations and sync metadata
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zaptap_sync::local_db::SqliteStore;
//! use zaptap_sync::offline::OperationQueue;
//!
//! # async fn example() -> zaptap_sync::Result<()> {
//! let store = SqliteStore::open("/tmp/zaptap/offline_queue.db").await?;
//! let queue = OperationQueue::open(Arc::new(store), 5).await?;
//! queue.enqueue("submit-review", serde_json::json!({ "stars": 5 })).await?;
//! # Ok(())
//! # }
//! ```

pub mod offline_queue;
pub mod schema;

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use crate::shared::error::{Result, SyncError};

/// SQLite-backed operation store
///
/// Manages the connection pool and the schema; the row mapping lives in
/// `offline_queue.rs`.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open or create the database file
    ///
    /// Creates parent directories and the file if missing, enables WAL mode
    /// and applies pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SyncError::storage(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        tracing::info!("[LocalDb] Opened {}", path.display());
        Self::with_pool(pool).await
    }

    /// Private in-memory database, gone when the store is dropped
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // Every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Get connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Current schema version
    pub async fn schema_version(&self) -> Result<i32> {
        let (version,): (i32,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;
        Ok(version)
    }

    /// Create base tables and run any pending migrations
    async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(schema::BASE_SCHEMA).execute(&self.pool).await?;
        self.run_migrations().await
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await?;
        if !schema::needs_migration(current_version) {
            return Ok(());
        }

        for version in schema::get_pending_migrations(current_version) {
            let sql = schema::migration_sql(version)
                .ok_or_else(|| SyncError::storage(format!("missing migration {}", version)))?;

            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(sql).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
                .bind(version)
                .bind(chrono::Utc::now().to_rfc3339())
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            tracing::info!("[LocalDb] Applied migration {}", version);
        }
        Ok(())
    }
}
