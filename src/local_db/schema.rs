//! Database Schema Definitions
//!
//! Schema version bookkeeping for the local queue database.

/// Current database schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Schema migration versions
///
/// 1: `offline_queue` table. 2: `sync_metadata` table.
pub const MIGRATION_VERSIONS: &[i32] = &[1, 2];

/// Base tables, idempotent
pub const BASE_SCHEMA: &str = include_str!("schema.sql");

/// Check if database needs migration
pub fn needs_migration(current_version: i32) -> bool {
    current_version < CURRENT_SCHEMA_VERSION
}

/// Get pending migrations
pub fn get_pending_migrations(current_version: i32) -> Vec<i32> {
    MIGRATION_VERSIONS
        .iter()
        .filter(|&&v| v > current_version)
        .cloned()
        .collect()
}

/// SQL applied for one migration version
pub fn migration_sql(version: i32) -> Option<&'static str> {
    match version {
        1 => Some(
            "CREATE TABLE IF NOT EXISTS offline_queue (
                id TEXT PRIMARY KEY NOT NULL,
                seq INTEGER NOT NULL,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                state TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                last_attempt_at TEXT,
                last_error TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_offline_queue_seq ON offline_queue (seq);",
        ),
        2 => Some(
            "CREATE TABLE IF NOT EXISTS sync_metadata (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        ),
        _ => None,
    }
}
