//! Database schema migrations for listentrack.
//!
//! Migrations are versioned and applied automatically when the store opens.
//! The `schema_version` table tracks the current migration version.
//!
//! Version 1 is the baseline layout (`listeners`, `actual_streams`). It is
//! written with `IF NOT EXISTS` so database files created before versioning
//! was tracked are adopted as-is.

use rusqlite::{Connection, Result as SqliteResult};
use tracing::{debug, warn};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 3;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);
    debug!(current_version, target = SCHEMA_VERSION, "checking schema");

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (fresh or pre-versioning database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: baseline tables.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS listeners (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp      TEXT NOT NULL,
            listener_count INTEGER NOT NULL,
            created_at     DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_timestamp ON listeners(timestamp);

        CREATE TABLE IF NOT EXISTS actual_streams (
            date       TEXT PRIMARY KEY,
            streams    INTEGER NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );",
    )?;
    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: index backing the peak-sample listing.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_listeners_count ON listeners(listener_count);",
    )?;
    set_schema_version(&tx, 2)?;
    tx.commit()
}

/// Migration v3: key-value table for daemon state (session snapshot).
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;
    set_schema_version(&tx, 3)?;
    tx.commit()
}
