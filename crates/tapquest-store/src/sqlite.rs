//! SQLite implementation of the device-side stores.
//!
//! One database file holds the local state snapshot and, for deployments that
//! run the redemption contract themselves, the redemption table. rusqlite
//! with bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use tapquest_core::encoding::{from_cbor, to_cbor};
use tapquest_core::{now_millis, LocalState, QrId};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{RedemptionStore, StateStore};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking failed: {}", e)))?
    }

    /// Register a redeemable code. Existing codes keep their state.
    pub async fn add_code(&self, qr_id: &QrId) -> Result<()> {
        let qr_id = qr_id.as_str().to_string();
        self.run(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO redemptions (qr_id, redeemed) VALUES (?1, 0)",
                params![qr_id],
            )?;
            Ok(())
        })
        .await
    }

    /// Whether a code has been redeemed. `None` for unknown codes.
    pub async fn is_redeemed(&self, qr_id: &QrId) -> Result<Option<bool>> {
        let qr_id = qr_id.as_str().to_string();
        self.run(move |conn| {
            let redeemed = conn
                .query_row(
                    "SELECT redeemed FROM redemptions WHERE qr_id = ?1",
                    params![qr_id],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?;
            Ok(redeemed.map(|r| r != 0))
        })
        .await
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn load(&self) -> Result<Option<LocalState>> {
        self.run(|conn| {
            let body: Option<Vec<u8>> = conn
                .query_row("SELECT body FROM local_state WHERE id = 1", [], |row| row.get(0))
                .optional()?;
            body.map(|bytes| from_cbor(&bytes).map_err(|e| StoreError::Serialization(e.to_string())))
                .transpose()
        })
        .await
    }

    async fn save(&self, state: &LocalState) -> Result<()> {
        let body = to_cbor(state).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO local_state (id, body, updated_at) VALUES (1, ?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
                params![body, now_millis() as i64],
            )?;
            Ok(())
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        self.run(|conn| {
            conn.execute("DELETE FROM local_state", [])?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl RedemptionStore for SqliteStore {
    async fn atomic_redeem(&self, qr_id: &QrId) -> Result<bool> {
        let qr_id = qr_id.as_str().to_string();
        self.run(move |conn| {
            // The WHERE clause is the compare; the row count says who won.
            let changed = conn.execute(
                "UPDATE redemptions SET redeemed = 1, redeemed_at = ?2
                 WHERE qr_id = ?1 AND redeemed = 0",
                params![qr_id, now_millis() as i64],
            )?;
            debug!(%qr_id, success = changed == 1, "atomic redeem");
            Ok(changed == 1)
        })
        .await
    }
}
