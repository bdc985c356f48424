//! Override store.
//!
//! # Data Flow
//! ```text
//! admin actions ──save/delete──▶ OverrideStore ◀──updated_since/keys── reconciler
//! ```
//!
//! # Design Decisions
//! - One row per key, no history beyond `prev_value`
//! - Range scans by `updated_at` are the only non-key query
//! - `save`, `delete` and `commit` are all-or-nothing per call

pub mod memory;
pub mod record;
pub mod sqlite;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

pub use memory::MemoryStore;
pub use record::OverrideRecord;
pub use sqlite::SqliteStore;

/// Errors raised by store backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("corrupt row for {key}: {message}")]
    Corrupt { key: String, message: String },

    #[error("store connection lock poisoned")]
    Poisoned,
}

/// Keyed table of override records.
pub trait OverrideStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<OverrideRecord>, StoreError>;

    /// Insert or replace `records` atomically.
    fn save(&self, records: &[OverrideRecord]) -> Result<(), StoreError>;

    /// Delete records for `keys`, returning how many rows went away.
    fn delete(&self, keys: &[String]) -> Result<usize, StoreError>;

    /// Records modified strictly after `since`, or every record when `None`.
    fn updated_since(&self, since: Option<DateTime<Utc>>)
        -> Result<Vec<OverrideRecord>, StoreError>;

    /// Keys of every stored record.
    fn keys(&self) -> Result<BTreeSet<String>, StoreError>;

    fn is_updated_since(&self, since: Option<DateTime<Utc>>) -> Result<bool, StoreError> {
        Ok(!self.updated_since(since)?.is_empty())
    }

    /// Save `records` and delete `keys` as one write. Returns the number of
    /// deleted rows.
    fn commit(&self, records: &[OverrideRecord], keys: &[String]) -> Result<usize, StoreError> {
        self.save(records)?;
        self.delete(keys)
    }
}
