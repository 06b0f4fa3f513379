//! Database test fixtures and utilities
//!
//! Every test gets its own SQLite file inside a temporary directory that is
//! removed when the returned `TempDir` is dropped.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use zaptap_sync::local_db::SqliteStore;

/// Temporary directory plus the database path inside it
pub fn temp_database() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("zaptap").join("offline_queue.db");
    (dir, path)
}

/// Open (or reopen) the store at `path`
pub async fn open_store(path: &PathBuf) -> Arc<SqliteStore> {
    Arc::new(
        SqliteStore::open(path)
            .await
            .expect("Failed to open test database"),
    )
}
