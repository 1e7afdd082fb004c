//! Versioned schema migrations for the device database.
//!
//! Each version is one batch of SQL applied inside a transaction, recorded in
//! `schema_migrations` once it commits.

use rusqlite::Connection;

use tapquest_core::now_millis;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema. Safe to call repeatedly.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis() as i64],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: local state snapshot and redemption codes.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Single-row snapshot of the device's LocalState, CBOR encoded
        CREATE TABLE local_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            body BLOB NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Redeemable codes; redeemed flips 0 -> 1 exactly once
        CREATE TABLE redemptions (
            qr_id TEXT PRIMARY KEY,
            redeemed INTEGER NOT NULL DEFAULT 0,
            redeemed_at INTEGER
        );
        "#,
    )?;

    Ok(())
}
