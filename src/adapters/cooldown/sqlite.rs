//! SQLite cooldown ledger
//!
//! One connection per operation, run on the blocking pool. The conditional
//! UPSERT in `try_fire` is the compare-and-set: SQLite serializes writers,
//! and the row only changes when the previous alert is outside the window.
//!
//! `last_alert_at` holds Unix milliseconds, so the window is enforced with
//! the same precision as the in-memory store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::ports::cooldown::{CooldownError, CooldownStore};

/// Default busy timeout while another writer holds the lock
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const TRY_FIRE_SQL: &str = "INSERT INTO cooldowns (key, last_alert_at) VALUES (?1, ?2) \
     ON CONFLICT(key) DO UPDATE SET last_alert_at = excluded.last_alert_at \
     WHERE ?2 - cooldowns.last_alert_at >= ?3";

/// A stored cooldown row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CooldownRecord {
    pub key: String,
    pub last_alert_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SqliteCooldownStore {
    db_path: PathBuf,
    cooldown: Duration,
    busy_timeout: Duration,
}

impl SqliteCooldownStore {
    /// Open (creating if needed) the ledger at `db_path`
    pub fn open(db_path: &Path, cooldown: Duration) -> Result<Self, CooldownError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| CooldownError::Storage(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let store = Self {
            db_path: db_path.to_path_buf(),
            cooldown,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        };
        store.init_schema().map_err(storage)?;
        Ok(store)
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn init_schema(&self) -> rusqlite::Result<()> {
        let conn = connect(&self.db_path, self.busy_timeout)?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cooldowns (
                key TEXT PRIMARY KEY,
                last_alert_at INTEGER NOT NULL
            );
            "#,
        )
    }

    fn cooldown_millis(&self) -> i64 {
        i64::try_from(self.cooldown.as_millis()).unwrap_or(i64::MAX)
    }

    /// Run a blocking operation on a fresh connection
    async fn run<T, F>(&self, op: F) -> Result<T, CooldownError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let path = self.db_path.clone();
        let busy_timeout = self.busy_timeout;
        tokio::task::spawn_blocking(move || {
            let conn = connect(&path, busy_timeout)?;
            op(&conn)
        })
        .await
        .map_err(|e| CooldownError::Task(e.to_string()))?
        .map_err(storage)
    }

    /// Most recent alerts, newest first
    pub async fn recent(&self, limit: usize) -> Result<Vec<CooldownRecord>, CooldownError> {
        let rows: Vec<(String, i64)> = self
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT key, last_alert_at FROM cooldowns ORDER BY last_alert_at DESC LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map(params![limit as i64], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(key, millis)| {
                let last_alert_at = from_unix_millis(&key, millis)?;
                Ok(CooldownRecord { key, last_alert_at })
            })
            .collect()
    }

    /// Drop rows whose window closed before `now`; returns rows removed
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, CooldownError> {
        let cutoff = now.timestamp_millis().saturating_sub(self.cooldown_millis());
        self.run(move |conn| {
            conn.execute("DELETE FROM cooldowns WHERE last_alert_at <= ?1", params![cutoff])
        })
        .await
    }
}

fn connect(path: &Path, busy_timeout: Duration) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    Ok(conn)
}

fn storage(e: rusqlite::Error) -> CooldownError {
    CooldownError::Storage(e.to_string())
}

fn from_unix_millis(key: &str, millis: i64) -> Result<DateTime<Utc>, CooldownError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| CooldownError::InvalidTimestamp(key.to_string()))
}

#[async_trait]
impl CooldownStore for SqliteCooldownStore {
    fn cooldown(&self) -> Duration {
        self.cooldown
    }

    async fn is_active(&self, key: &str, now: DateTime<Utc>) -> Result<bool, CooldownError> {
        let cooldown = self.cooldown_millis();
        let now = now.timestamp_millis();
        let key = key.to_string();

        let last: Option<i64> = self
            .run(move |conn| {
                conn.query_row(
                    "SELECT last_alert_at FROM cooldowns WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;

        Ok(matches!(last, Some(last) if now.saturating_sub(last) < cooldown))
    }

    async fn try_fire(&self, key: &str, now: DateTime<Utc>) -> Result<bool, CooldownError> {
        let cooldown = self.cooldown_millis();
        let now = now.timestamp_millis();
        let key = key.to_string();

        let changed = self
            .run(move |conn| conn.execute(TRY_FIRE_SQL, params![key, now, cooldown]))
            .await?;

        Ok(changed == 1)
    }

    async fn last_alert_at(&self, key: &str) -> Result<Option<DateTime<Utc>>, CooldownError> {
        let owned = key.to_string();
        let last: Option<i64> = self
            .run(move |conn| {
                conn.query_row(
                    "SELECT last_alert_at FROM cooldowns WHERE key = ?1",
                    params![owned],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;

        last.map(|millis| from_unix_millis(key, millis)).transpose()
    }
}
