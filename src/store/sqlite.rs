//! SQLite-backed override store.
//!
//! Timestamps are stored as integer microseconds since the Unix epoch.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::store::{OverrideRecord, OverrideStore, StoreError};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS editable_config_option (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL,
        prev_value TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS editable_config_option_updated_at
        ON editable_config_option (updated_at);
";

const SELECT: &str = "SELECT key, value, updated_at, prev_value FROM editable_config_option";

/// Durable store over a single SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`. `:memory:` is accepted.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    /// Wrap an existing connection, creating the table if needed.
    pub fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

struct RawRow {
    key: String,
    value: String,
    updated_at: i64,
    prev_value: String,
}

impl RawRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            value: row.get(1)?,
            updated_at: row.get(2)?,
            prev_value: row.get(3)?,
        })
    }

    fn into_record(self) -> Result<OverrideRecord, StoreError> {
        let updated_at = DateTime::<Utc>::from_timestamp_micros(self.updated_at).ok_or_else(|| {
            StoreError::Corrupt {
                key: self.key.clone(),
                message: format!("timestamp out of range: {}", self.updated_at),
            }
        })?;
        Ok(OverrideRecord {
            key: self.key,
            value: self.value,
            prev_value: self.prev_value,
            updated_at,
        })
    }
}

impl OverrideStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<OverrideRecord>, StoreError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(&format!("{} WHERE key = ?1", SELECT), params![key], RawRow::read)
            .optional()?;
        raw.map(RawRow::into_record).transpose()
    }

    fn save(&self, records: &[OverrideRecord]) -> Result<(), StoreError> {
        self.commit(records, &[]).map(|_| ())
    }

    fn delete(&self, keys: &[String]) -> Result<usize, StoreError> {
        self.commit(&[], keys)
    }

    fn commit(&self, records: &[OverrideRecord], keys: &[String]) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
            let mut upsert = tx.prepare_cached(
                "INSERT INTO editable_config_option (key, value, updated_at, prev_value)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at,
                     prev_value = excluded.prev_value",
            )?;
            for record in records {
                upsert.execute(params![
                    record.key,
                    record.value,
                    record.updated_at.timestamp_micros(),
                    record.prev_value,
                ])?;
            }

            let mut delete =
                tx.prepare_cached("DELETE FROM editable_config_option WHERE key = ?1")?;
            for key in keys {
                removed += delete.execute(params![key])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    fn updated_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<OverrideRecord>, StoreError> {
        let conn = self.lock()?;
        let rows = match since {
            Some(since) => {
                let mut stmt = conn.prepare_cached(&format!("{} WHERE updated_at > ?1", SELECT))?;
                let rows = stmt
                    .query_map(params![since.timestamp_micros()], RawRow::read)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare_cached(SELECT)?;
                let rows = stmt
                    .query_map([], RawRow::read)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        rows.into_iter().map(RawRow::into_record).collect()
    }

    fn keys(&self) -> Result<BTreeSet<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached("SELECT key FROM editable_config_option")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;
        Ok(keys)
    }

    fn is_updated_since(&self, since: Option<DateTime<Utc>>) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let exists = match since {
            Some(since) => conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM editable_config_option WHERE updated_at > ?1)",
                params![since.timestamp_micros()],
                |row| row.get(0),
            )?,
            None => conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM editable_config_option)",
                [],
                |row| row.get(0),
            )?,
        };
        Ok(exists)
    }
}
