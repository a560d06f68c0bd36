//! Database schema and migrations.

use rusqlite::Connection;
use tracing::info;

use crate::error::{Error, Result};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the database schema, migrating older databases forward.
pub fn initialize(conn: &Connection) -> Result<()> {
    let found = get_schema_version(conn)?;

    if found > SCHEMA_VERSION {
        return Err(Error::UnsupportedSchema {
            found,
            supported: SCHEMA_VERSION,
        });
    }
    if found == SCHEMA_VERSION {
        return Ok(());
    }

    // All steps land together or not at all
    let tx = conn.unchecked_transaction()?;
    if found == 0 {
        create_schema_v1(&tx)?;
    }
    if found < 2 {
        migrate_to_v2(&tx)?;
    }
    set_schema_version(&tx, SCHEMA_VERSION)?;
    tx.commit()?;

    if found > 0 {
        info!("Database schema migrated from version {} to {}", found, SCHEMA_VERSION);
    }
    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 =
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;

    Ok(version)
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Create the initial schema (version 1).
fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        -- One row per normalized coordinate pair
        CREATE TABLE IF NOT EXISTS locations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            timestamp INTEGER NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_locations_coordinate
            ON locations(latitude, longitude);
        CREATE INDEX IF NOT EXISTS idx_locations_timestamp
            ON locations(timestamp);

        -- Durable background work units
        CREATE TABLE IF NOT EXISTS work_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            state TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL,
            enqueued_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            next_run_at INTEGER NOT NULL,
            last_error TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_work_queue_due
            ON work_queue(state, next_run_at);
        "#,
    )?;

    Ok(())
}

/// Version 2: claim leases and the location a succeeded unit saved.
///
/// Units left `running` by version 1 have no lease and are treated as
/// expired.
fn migrate_to_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        ALTER TABLE work_queue ADD COLUMN lease_expires_at INTEGER;
        ALTER TABLE work_queue ADD COLUMN location_id INTEGER;
        "#,
    )?;
    Ok(())
}
