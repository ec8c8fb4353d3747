//! In-memory snapshot and history store.

use super::{
    HistoryStore, InsertOutcome, SnapshotStore, StorageError, UpsertGuard, UpsertOutcome,
    WriteMode,
};
use crate::domain::IndicatorSet;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

type HistoryMap = BTreeMap<String, BTreeMap<NaiveDate, IndicatorSet>>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshots: Mutex<BTreeMap<String, IndicatorSet>>,
    history: Mutex<HistoryMap>,
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    m.lock()
        .map_err(|_| StorageError::Poisoned("memory store".into()))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total history records across all symbols.
    pub fn history_len(&self) -> usize {
        lock(&self.history)
            .map(|h| h.values().map(BTreeMap::len).sum())
            .unwrap_or(0)
    }
}

impl SnapshotStore for MemoryStore {
    fn get_snapshot(&self, symbol: &str) -> Result<Option<IndicatorSet>, StorageError> {
        Ok(lock(&self.snapshots)?.get(symbol).cloned())
    }

    fn upsert_snapshot(
        &self,
        set: &IndicatorSet,
        guard: UpsertGuard,
    ) -> Result<UpsertOutcome, StorageError> {
        let mut snapshots = lock(&self.snapshots)?;
        if let Some(existing) = snapshots.get(&set.symbol) {
            if !guard.admits(existing.calculated_date, set.calculated_date) {
                return Ok(UpsertOutcome::Rejected {
                    existing: existing.calculated_date,
                });
            }
        }
        snapshots.insert(set.symbol.clone(), set.clone());
        Ok(UpsertOutcome::Written)
    }

    fn snapshot_symbols(&self) -> Result<Vec<String>, StorageError> {
        Ok(lock(&self.snapshots)?.keys().cloned().collect())
    }
}

impl HistoryStore for MemoryStore {
    fn insert_history(
        &self,
        set: &IndicatorSet,
        mode: WriteMode,
    ) -> Result<InsertOutcome, StorageError> {
        let mut history = lock(&self.history)?;
        let records = history.entry(set.symbol.clone()).or_default();
        let outcome = match (records.contains_key(&set.calculated_date), mode) {
            (false, _) => InsertOutcome::Inserted,
            (true, WriteMode::InsertIfAbsent) => return Ok(InsertOutcome::Kept),
            (true, WriteMode::Replace) => InsertOutcome::Replaced,
        };
        records.insert(set.calculated_date, set.clone());
        Ok(outcome)
    }

    fn get_history(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Option<IndicatorSet>, StorageError> {
        Ok(lock(&self.history)?
            .get(symbol)
            .and_then(|r| r.get(&date))
            .cloned())
    }

    fn history_range(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<IndicatorSet>, StorageError> {
        if start > end {
            return Ok(Vec::new());
        }
        Ok(lock(&self.history)?
            .get(symbol)
            .map(|r| r.range(start..=end).map(|(_, s)| s.clone()).collect())
            .unwrap_or_default())
    }

    fn latest_history(&self, symbol: &str) -> Result<Option<IndicatorSet>, StorageError> {
        Ok(lock(&self.history)?
            .get(symbol)
            .and_then(|r| r.values().next_back())
            .cloned())
    }

    fn symbols(&self) -> Result<Vec<String>, StorageError> {
        Ok(lock(&self.history)?
            .iter()
            .filter(|(_, r)| !r.is_empty())
            .map(|(s, _)| s.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn set(day: u32, source: &str) -> IndicatorSet {
        IndicatorSet::empty("SPY", d(day), source)
    }

    #[test]
    fn snapshot_guard_rejects_older() {
        let store = MemoryStore::new();
        assert_eq!(
            store.upsert_snapshot(&set(5, "a"), UpsertGuard::NotOlder).unwrap(),
            UpsertOutcome::Written
        );
        assert_eq!(
            store.upsert_snapshot(&set(4, "a"), UpsertGuard::NotOlder).unwrap(),
            UpsertOutcome::Rejected { existing: d(5) }
        );
        assert_eq!(
            store.upsert_snapshot(&set(5, "b"), UpsertGuard::StrictlyNewer).unwrap(),
            UpsertOutcome::Rejected { existing: d(5) }
        );
        assert_eq!(store.get_snapshot("SPY").unwrap().unwrap().source, "a");
    }

    #[test]
    fn history_insert_if_absent_keeps_existing() {
        let store = MemoryStore::new();
        assert_eq!(
            store.insert_history(&set(2, "a"), WriteMode::InsertIfAbsent).unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            store.insert_history(&set(2, "b"), WriteMode::InsertIfAbsent).unwrap(),
            InsertOutcome::Kept
        );
        assert_eq!(store.get_history("SPY", d(2)).unwrap().unwrap().source, "a");

        assert_eq!(
            store.insert_history(&set(2, "b"), WriteMode::Replace).unwrap(),
            InsertOutcome::Replaced
        );
        assert_eq!(store.get_history("SPY", d(2)).unwrap().unwrap().source, "b");
    }

    #[test]
    fn history_range_and_latest() {
        let store = MemoryStore::new();
        for day in [5, 2, 9] {
            store.insert_history(&set(day, "a"), WriteMode::InsertIfAbsent).unwrap();
        }
        let range: Vec<NaiveDate> = store
            .history_range("SPY", d(1), d(6))
            .unwrap()
            .iter()
            .map(|s| s.calculated_date)
            .collect();
        assert_eq!(range, vec![d(2), d(5)]);
        assert_eq!(store.latest_date("SPY").unwrap(), Some(d(9)));
        assert_eq!(store.recorded_dates("SPY", d(1), d(31)).unwrap().len(), 3);
        assert_eq!(store.symbols().unwrap(), vec!["SPY".to_string()]);
        assert_eq!(store.history_len(), 3);
    }
}
