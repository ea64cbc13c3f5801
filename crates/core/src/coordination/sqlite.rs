//! SQLite-backed coordination store.
//!
//! A database file on storage shared by every worker. Leases are rows with
//! an absolute expiry; counters are versioned rows updated with an
//! optimistic compare-and-swap loop, so no server-side scripting is needed.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use super::types::{CoordinationStore, StoreError};

/// Compare-and-swap attempts before a counter update is reported as contended.
const MAX_CAS_ATTEMPTS: u32 = 16;

/// SQLite coordination store.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", path.display(), e)))?;
        conn.busy_timeout(busy_timeout)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            -- Keys written by set_if_absent (locks)
            CREATE TABLE IF NOT EXISTS leases (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_leases_expires_at ON leases(expires_at);

            -- Keys written by bounded_increment (admission counters)
            CREATE TABLE IF NOT EXISTS counters (
                key TEXT PRIMARY KEY,
                count INTEGER NOT NULL DEFAULT 0 CHECK (count >= 0),
                version INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )?;
        Ok(())
    }

    /// Run a closure against the connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Backend("connection mutex poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("store task failed: {}", e)))?
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl CoordinationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let key = key.to_string();
        let value = value.to_string();
        self.with_conn(move |conn| {
            let now = now_millis();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                "DELETE FROM leases WHERE key = ?1 AND expires_at <= ?2",
                params![key, now],
            )?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO leases (key, value, expires_at) VALUES (?1, ?2, ?3)",
                params![key, value, now.saturating_add(ttl_millis(ttl))],
            )?;
            tx.commit()?;
            Ok(inserted == 1)
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM leases WHERE key = ?1 AND expires_at > ?2",
                    params![key, now_millis()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn compare_and_delete(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let key = key.to_string();
        let value = value.to_string();
        self.with_conn(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM leases WHERE key = ?1 AND value = ?2",
                params![key, value],
            )?;
            Ok(deleted == 1)
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let leases = conn.execute("DELETE FROM leases WHERE key = ?1", params![key])?;
            let counters = conn.execute("DELETE FROM counters WHERE key = ?1", params![key])?;
            Ok(leases + counters > 0)
        })
        .await
    }

    async fn bounded_increment(&self, key: &str, limit: u64) -> Result<Option<u64>, StoreError> {
        let key = key.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            for attempt in 1..=MAX_CAS_ATTEMPTS {
                let current: Option<(i64, i64)> = conn
                    .query_row(
                        "SELECT count, version FROM counters WHERE key = ?1",
                        params![key],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;

                let swapped = match current {
                    None => {
                        if limit < 1 {
                            return Ok(None);
                        }
                        conn.execute(
                            "INSERT OR IGNORE INTO counters (key, count, version) VALUES (?1, 1, 0)",
                            params![key],
                        )? == 1
                    }
                    Some((count, version)) => {
                        if count >= limit {
                            return Ok(None);
                        }
                        conn.execute(
                            "UPDATE counters SET count = ?1, version = version + 1
                             WHERE key = ?2 AND version = ?3",
                            params![count + 1, key, version],
                        )? == 1
                    }
                };

                if swapped {
                    let new_count = current.map(|(count, _)| count + 1).unwrap_or(1);
                    return Ok(Some(new_count as u64));
                }
                debug!("Counter {} changed concurrently (attempt {})", key, attempt);
            }
            Err(StoreError::Contention {
                key,
                attempts: MAX_CAS_ATTEMPTS,
            })
        })
        .await
    }

    async fn decrement(&self, key: &str) -> Result<u64, StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE counters SET count = count - 1, version = version + 1
                 WHERE key = ?1 AND count > 0",
                params![key],
            )?;
            let count: Option<i64> = conn
                .query_row(
                    "SELECT count FROM counters WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(count.unwrap_or(0) as u64)
        })
        .await
    }

    async fn counter(&self, key: &str) -> Result<u64, StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let count: Option<i64> = conn
                .query_row(
                    "SELECT count FROM counters WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(count.unwrap_or(0) as u64)
        })
        .await
    }

    async fn has_prefix(&self, prefix: &str) -> Result<bool, StoreError> {
        let prefix = prefix.to_string();
        self.with_conn(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM leases
                     WHERE substr(key, 1, length(?1)) = ?1 AND expires_at > ?2
                     LIMIT 1",
                    params![prefix, now_millis()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }
}
