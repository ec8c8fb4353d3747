//! Persistence abstractions for computed indicator sets.
//!
//! - `SnapshotStore`: one row per symbol, upserted under a monotonic
//!   `calculated_date` guard evaluated atomically with the write.
//! - `HistoryStore`: one row per (symbol, date), append-only unless the
//!   caller explicitly asks to replace.
//!
//! Backends serialize writes per symbol; different symbols proceed in
//! parallel.

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use crate::domain::IndicatorSet;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::io;
use thiserror::Error;

/// Retry classification of a storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// Timeout or contention; worth retrying.
    Transient,
    /// Schema, permission, or serialization; retrying cannot help.
    Permanent,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage timeout: {0}")]
    Timeout(String),

    #[error("write contention: {0}")]
    Contention(String),

    #[error("lock poisoned: {0}")]
    Poisoned(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("invalid key '{0}'")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl StorageError {
    pub fn kind(&self) -> StorageErrorKind {
        match self {
            StorageError::Timeout(_)
            | StorageError::Contention(_)
            | StorageError::Unavailable(_) => StorageErrorKind::Transient,
            StorageError::Permission(_)
            | StorageError::Poisoned(_)
            | StorageError::Schema(_)
            | StorageError::InvalidKey(_)
            | StorageError::Io(_) => StorageErrorKind::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == StorageErrorKind::Transient
    }
}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::PermissionDenied => StorageError::Permission(e.to_string()),
            io::ErrorKind::TimedOut => StorageError::Timeout(e.to_string()),
            io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => {
                StorageError::Contention(e.to_string())
            }
            _ => StorageError::Io(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Schema(e.to_string())
    }
}

/// Monotonic rule applied to a snapshot upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertGuard {
    /// Batch authority: replace unless the stored row is newer.
    NotOlder,
    /// Cache fill: replace only if the stored row is strictly older.
    StrictlyNewer,
}

impl UpsertGuard {
    pub fn admits(self, existing: NaiveDate, incoming: NaiveDate) -> bool {
        match self {
            UpsertGuard::NotOlder => incoming >= existing,
            UpsertGuard::StrictlyNewer => incoming > existing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Written,
    Rejected { existing: NaiveDate },
}

/// How a history insert treats an existing (symbol, date) row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Existing record wins; the insert is a no-op.
    InsertIfAbsent,
    /// Explicit force: the new record replaces the old one.
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Replaced,
    Kept,
}

impl InsertOutcome {
    pub fn wrote(self) -> bool {
        !matches!(self, InsertOutcome::Kept)
    }
}

pub trait SnapshotStore: Send + Sync {
    fn get_snapshot(&self, symbol: &str) -> Result<Option<IndicatorSet>, StorageError>;

    /// Replace the symbol's row if `guard` admits the incoming date.
    fn upsert_snapshot(
        &self,
        set: &IndicatorSet,
        guard: UpsertGuard,
    ) -> Result<UpsertOutcome, StorageError>;

    fn snapshot_symbols(&self) -> Result<Vec<String>, StorageError>;

    fn health_check(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

pub trait HistoryStore: Send + Sync {
    fn insert_history(
        &self,
        set: &IndicatorSet,
        mode: WriteMode,
    ) -> Result<InsertOutcome, StorageError>;

    /// Insert several records, returning one outcome per input in order.
    ///
    /// Backends that pay per call (file rewrites, round trips) override this
    /// to read existing dates once and write in a single pass. Re-running a
    /// batch after a failure is safe: records that already landed come back
    /// `Kept` under `InsertIfAbsent` and are rewritten identically under
    /// `Replace`.
    fn insert_history_batch(
        &self,
        sets: &[IndicatorSet],
        mode: WriteMode,
    ) -> Result<Vec<InsertOutcome>, StorageError> {
        sets.iter().map(|set| self.insert_history(set, mode)).collect()
    }

    fn get_history(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Option<IndicatorSet>, StorageError>;

    /// Records in `[start, end]`, ascending by date.
    fn history_range(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<IndicatorSet>, StorageError>;

    /// Dates already recorded in `[start, end]`.
    fn recorded_dates(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeSet<NaiveDate>, StorageError> {
        Ok(self
            .history_range(symbol, start, end)?
            .into_iter()
            .map(|s| s.calculated_date)
            .collect())
    }

    fn latest_history(&self, symbol: &str) -> Result<Option<IndicatorSet>, StorageError>;

    fn latest_date(&self, symbol: &str) -> Result<Option<NaiveDate>, StorageError> {
        Ok(self.latest_history(symbol)?.map(|s| s.calculated_date))
    }

    /// Symbols with at least one record, sorted.
    fn symbols(&self) -> Result<Vec<String>, StorageError>;

    fn health_check(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
