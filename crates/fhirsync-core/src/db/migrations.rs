//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }
    if version < 3 {
        migrate_v3(conn).await?;
    }

    Ok(())
}

/// Schema version recorded in `schema_version`, or 0 for a fresh database
async fn get_version(conn: &Connection) -> Result<i32> {
    let has_table = query_i32(
        conn,
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
    )
    .await?;
    if has_table == 0 {
        return Ok(0);
    }
    query_i32(conn, "SELECT COALESCE(MAX(version), 0) FROM schema_version").await
}

async fn query_i32(conn: &Connection, sql: &str) -> Result<i32> {
    let mut rows = conn.query(sql, ()).await?;
    match rows.next().await? {
        Some(row) => Ok(row.get(0)?),
        None => Ok(0),
    }
}

/// Run `statements` as one transaction.
async fn apply(conn: &Connection, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }
    Ok(())
}

/// Migration to version 1: resources and the local change log
async fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            "CREATE TABLE IF NOT EXISTS resources (
                resource_type TEXT NOT NULL,
                resource_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                version_id TEXT,
                last_updated TEXT,
                PRIMARY KEY (resource_type, resource_id)
            )",
            // AUTOINCREMENT keeps ids monotonic even after the newest row is deleted
            "CREATE TABLE IF NOT EXISTS local_changes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                resource_type TEXT NOT NULL,
                resource_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                change_type TEXT NOT NULL CHECK (change_type IN ('INSERT', 'UPDATE', 'DELETE')),
                payload TEXT NOT NULL DEFAULT ''
            )",
            "CREATE INDEX IF NOT EXISTS idx_local_changes_resource
                ON local_changes(resource_type, resource_id, id)",
            "INSERT INTO schema_version (version) VALUES (1)",
        ],
    )
    .await?;

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: download bookkeeping
async fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            "CREATE TABLE IF NOT EXISTS synced_resources (
                resource_type TEXT PRIMARY KEY,
                last_updated TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS sync_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            "INSERT INTO schema_version (version) VALUES (2)",
        ],
    )
    .await?;

    tracing::info!("Migrated database to version 2");
    Ok(())
}

/// Migration to version 3: server version each change was made against
async fn migrate_v3(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            "ALTER TABLE local_changes ADD COLUMN version_id TEXT",
            "INSERT INTO schema_version (version) VALUES (3)",
        ],
    )
    .await?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}
