//! File-backed store: JSON snapshots plus JSONL history.
//!
//! Layout under `root`:
//! - `snapshots/{SYMBOL}.json` (one document, replaced via tmp + rename)
//! - `history/symbol={SYMBOL}/records.jsonl` (one IndicatorSet per line)
//!
//! Non-force history writes only ever append, so an existing record's bytes
//! are never touched. A forced replace rewrites the symbol's file through
//! tmp + rename. All writes for one symbol hold that symbol's lock.
//!
//! A batch parses the symbol's file once, appends every new record with one
//! open and one sync, and folds every replacement into at most one rewrite.

use super::{
    HistoryStore, InsertOutcome, SnapshotStore, StorageError, UpsertGuard, UpsertOutcome,
    WriteMode,
};
use crate::data::validate_symbol;
use crate::domain::IndicatorSet;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

const HISTORY_FILE: &str = "records.jsonl";

pub struct JsonFileStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn snapshot_dir(&self) -> PathBuf {
        self.root.join("snapshots")
    }

    fn snapshot_path(&self, symbol: &str) -> PathBuf {
        self.snapshot_dir().join(format!("{symbol}.json"))
    }

    fn history_dir(&self) -> PathBuf {
        self.root.join("history")
    }

    fn history_path(&self, symbol: &str) -> PathBuf {
        self.history_dir()
            .join(format!("symbol={symbol}"))
            .join(HISTORY_FILE)
    }

    fn lock_for(&self, symbol: &str) -> Result<Arc<Mutex<()>>, StorageError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| StorageError::Poisoned("lock registry".into()))?;
        Ok(locks.entry(symbol.to_string()).or_default().clone())
    }

    /// A writer that panicked mid-write leaves the lock poisoned; that never
    /// clears on retry, so it surfaces as a permanent error.
    fn hold<'a>(lock: &'a Mutex<()>, symbol: &str) -> Result<MutexGuard<'a, ()>, StorageError> {
        lock.lock()
            .map_err(|_| StorageError::Poisoned(format!("lock for {symbol}")))
    }

    fn check_key(symbol: &str) -> Result<(), StorageError> {
        validate_symbol(symbol).map_err(|_| StorageError::InvalidKey(symbol.to_string()))
    }

    fn read_snapshot(&self, symbol: &str) -> Result<Option<IndicatorSet>, StorageError> {
        match fs::read_to_string(self.snapshot_path(symbol)) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Raw lines of a symbol's history file, blank lines dropped.
    fn read_history_lines(&self, symbol: &str) -> Result<Vec<String>, StorageError> {
        let file = match fs::File::open(self.history_path(symbol)) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut lines = Vec::new();
        for line in io::BufReader::new(file).lines() {
            let line = line?;
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }
        Ok(lines)
    }

    /// Parsed history keyed by date. Malformed lines are skipped with a warning.
    fn read_history(&self, symbol: &str) -> Result<BTreeMap<NaiveDate, IndicatorSet>, StorageError> {
        let mut records = BTreeMap::new();
        for (lineno, line) in self.read_history_lines(symbol)?.iter().enumerate() {
            match serde_json::from_str::<IndicatorSet>(line) {
                Ok(set) => {
                    records.insert(set.calculated_date, set);
                }
                Err(e) => {
                    warn!(symbol, line = lineno + 1, error = %e, "skipping malformed history line");
                }
            }
        }
        Ok(records)
    }

    /// Append records with one open and one sync.
    fn append_history(&self, symbol: &str, sets: &[&IndicatorSet]) -> Result<(), StorageError> {
        if sets.is_empty() {
            return Ok(());
        }
        let path = self.history_path(symbol);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = String::new();
        for set in sets {
            out.push_str(&serde_json::to_string(set)?);
            out.push('\n');
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(out.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    /// Rewrite the file once: lines whose date is in `replacements` take the
    /// new record, other lines (malformed ones included) are kept verbatim,
    /// and `appended` goes at the end.
    fn rewrite_history(
        &self,
        symbol: &str,
        replacements: &BTreeMap<NaiveDate, &IndicatorSet>,
        appended: &[&IndicatorSet],
    ) -> Result<(), StorageError> {
        let path = self.history_path(symbol);
        let mut out = String::new();
        for line in self.read_history_lines(symbol)? {
            let replacement = serde_json::from_str::<IndicatorSet>(&line)
                .ok()
                .and_then(|s| replacements.get(&s.calculated_date));
            match replacement {
                Some(set) => out.push_str(&serde_json::to_string(set)?),
                None => out.push_str(&line),
            }
            out.push('\n');
        }
        for set in appended {
            out.push_str(&serde_json::to_string(set)?);
            out.push('\n');
        }
        write_atomic(&path, out.as_bytes())
    }
}

/// Write to `{path}.tmp`, fsync, rename into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        StorageError::from(e)
    })
}

impl SnapshotStore for JsonFileStore {
    fn get_snapshot(&self, symbol: &str) -> Result<Option<IndicatorSet>, StorageError> {
        Self::check_key(symbol)?;
        self.read_snapshot(symbol)
    }

    fn upsert_snapshot(
        &self,
        set: &IndicatorSet,
        guard: UpsertGuard,
    ) -> Result<UpsertOutcome, StorageError> {
        Self::check_key(&set.symbol)?;
        let lock = self.lock_for(&set.symbol)?;
        let _held = Self::hold(&lock, &set.symbol)?;

        if let Some(existing) = self.read_snapshot(&set.symbol)? {
            if !guard.admits(existing.calculated_date, set.calculated_date) {
                return Ok(UpsertOutcome::Rejected {
                    existing: existing.calculated_date,
                });
            }
        }

        let json = serde_json::to_vec_pretty(set)?;
        write_atomic(&self.snapshot_path(&set.symbol), &json)?;
        debug!(symbol = %set.symbol, date = %set.calculated_date, "snapshot written");
        Ok(UpsertOutcome::Written)
    }

    fn snapshot_symbols(&self) -> Result<Vec<String>, StorageError> {
        let dir = self.snapshot_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut symbols = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                symbols.push(stem.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }

    /// Both directories exist (or can be created) and are writable.
    fn health_check(&self) -> Result<(), StorageError> {
        for dir in [self.snapshot_dir(), self.history_dir()] {
            fs::create_dir_all(&dir)?;
            let probe = dir.join(".probe");
            fs::write(&probe, b"ok")?;
            fs::remove_file(&probe)?;
        }
        Ok(())
    }
}

impl HistoryStore for JsonFileStore {
    fn insert_history(
        &self,
        set: &IndicatorSet,
        mode: WriteMode,
    ) -> Result<InsertOutcome, StorageError> {
        let outcomes = self.insert_history_batch(std::slice::from_ref(set), mode)?;
        Ok(outcomes.first().copied().unwrap_or(InsertOutcome::Kept))
    }

    fn insert_history_batch(
        &self,
        sets: &[IndicatorSet],
        mode: WriteMode,
    ) -> Result<Vec<InsertOutcome>, StorageError> {
        let Some(first) = sets.first() else {
            return Ok(Vec::new());
        };
        if sets.iter().any(|s| s.symbol != first.symbol) {
            let mut outcomes = Vec::with_capacity(sets.len());
            for set in sets {
                outcomes.extend(self.insert_history_batch(std::slice::from_ref(set), mode)?);
            }
            return Ok(outcomes);
        }
        let symbol = first.symbol.as_str();
        Self::check_key(symbol)?;
        let lock = self.lock_for(symbol)?;
        let _held = Self::hold(&lock, symbol)?;

        let on_disk: BTreeSet<NaiveDate> = self.read_history(symbol)?.into_keys().collect();
        let mut replacements: BTreeMap<NaiveDate, &IndicatorSet> = BTreeMap::new();
        let mut appended: BTreeMap<NaiveDate, &IndicatorSet> = BTreeMap::new();
        let mut outcomes = Vec::with_capacity(sets.len());

        for set in sets {
            let date = set.calculated_date;
            let exists = on_disk.contains(&date) || appended.contains_key(&date);
            let outcome = match (exists, mode) {
                (false, _) => {
                    appended.insert(date, set);
                    InsertOutcome::Inserted
                }
                (true, WriteMode::InsertIfAbsent) => InsertOutcome::Kept,
                (true, WriteMode::Replace) => {
                    if on_disk.contains(&date) {
                        replacements.insert(date, set);
                    } else {
                        appended.insert(date, set);
                    }
                    InsertOutcome::Replaced
                }
            };
            outcomes.push(outcome);
        }

        let appended: Vec<&IndicatorSet> = appended.into_values().collect();
        if replacements.is_empty() {
            self.append_history(symbol, &appended)?;
        } else {
            self.rewrite_history(symbol, &replacements, &appended)?;
        }
        debug!(
            symbol,
            appended = appended.len(),
            replaced = replacements.len(),
            "history batch written"
        );
        Ok(outcomes)
    }

    fn get_history(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Option<IndicatorSet>, StorageError> {
        Self::check_key(symbol)?;
        Ok(self.read_history(symbol)?.remove(&date))
    }

    fn history_range(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<IndicatorSet>, StorageError> {
        Self::check_key(symbol)?;
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self
            .read_history(symbol)?
            .into_iter()
            .filter(|(d, _)| *d >= start && *d <= end)
            .map(|(_, s)| s)
            .collect())
    }

    fn latest_history(&self, symbol: &str) -> Result<Option<IndicatorSet>, StorageError> {
        Self::check_key(symbol)?;
        Ok(self.read_history(symbol)?.pop_last().map(|(_, s)| s))
    }

    fn symbols(&self) -> Result<Vec<String>, StorageError> {
        let dir = self.history_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut symbols = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.path().join(HISTORY_FILE).exists() {
                continue;
            }
            if let Some(sym) = entry.file_name().to_str().and_then(|n| n.strip_prefix("symbol=")) {
                symbols.push(sym.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }

    fn health_check(&self) -> Result<(), StorageError> {
        SnapshotStore::health_check(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IndicatorValue;
    use rust_decimal::Decimal;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn set(day: u32, rsi: i64) -> IndicatorSet {
        let mut s = IndicatorSet::empty("SPY", d(day), "vendor_a");
        s.rsi_14 = IndicatorValue::Value(Decimal::new(rsi, 0));
        s
    }

    fn store() -> (tempfile::TempDir, JsonFileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn snapshot_roundtrip_and_guard() {
        let (_dir, store) = store();
        assert!(store.get_snapshot("SPY").unwrap().is_none());

        store.upsert_snapshot(&set(5, 40), UpsertGuard::NotOlder).unwrap();
        assert_eq!(
            store.upsert_snapshot(&set(4, 41), UpsertGuard::NotOlder).unwrap(),
            UpsertOutcome::Rejected { existing: d(5) }
        );
        assert_eq!(store.get_snapshot("SPY").unwrap().unwrap(), set(5, 40));
        assert_eq!(store.snapshot_symbols().unwrap(), vec!["SPY".to_string()]);
    }

    #[test]
    fn non_force_insert_leaves_file_untouched() {
        let (dir, store) = store();
        store.insert_history(&set(2, 40), WriteMode::InsertIfAbsent).unwrap();
        let path = dir.path().join("history/symbol=SPY/records.jsonl");
        let before = fs::read(&path).unwrap();

        let outcome = store.insert_history(&set(2, 99), WriteMode::InsertIfAbsent).unwrap();
        assert_eq!(outcome, InsertOutcome::Kept);
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn force_replaces_only_target_date() {
        let (_dir, store) = store();
        store.insert_history(&set(2, 40), WriteMode::InsertIfAbsent).unwrap();
        store.insert_history(&set(3, 50), WriteMode::InsertIfAbsent).unwrap();

        let outcome = store.insert_history(&set(2, 99), WriteMode::Replace).unwrap();
        assert_eq!(outcome, InsertOutcome::Replaced);
        assert_eq!(store.get_history("SPY", d(2)).unwrap().unwrap(), set(2, 99));
        assert_eq!(store.get_history("SPY", d(3)).unwrap().unwrap(), set(3, 50));
    }

    #[test]
    fn range_sorted_even_when_appended_out_of_order() {
        let (_dir, store) = store();
        for day in [9, 2, 5] {
            store.insert_history(&set(day, 40), WriteMode::InsertIfAbsent).unwrap();
        }
        let dates: Vec<NaiveDate> = store
            .history_range("SPY", d(1), d(31))
            .unwrap()
            .iter()
            .map(|s| s.calculated_date)
            .collect();
        assert_eq!(dates, vec![d(2), d(5), d(9)]);
        assert_eq!(store.latest_date("SPY").unwrap(), Some(d(9)));
        assert_eq!(HistoryStore::symbols(&store).unwrap(), vec!["SPY".to_string()]);
    }

    #[test]
    fn batch_appends_new_and_keeps_existing() {
        let (dir, store) = store();
        store.insert_history(&set(3, 40), WriteMode::InsertIfAbsent).unwrap();
        let path = dir.path().join("history/symbol=SPY/records.jsonl");
        let first_line = fs::read_to_string(&path).unwrap();

        let batch = vec![set(2, 10), set(3, 99), set(4, 30), set(4, 31)];
        let outcomes = store.insert_history_batch(&batch, WriteMode::InsertIfAbsent).unwrap();
        assert_eq!(
            outcomes,
            vec![
                InsertOutcome::Inserted,
                InsertOutcome::Kept,
                InsertOutcome::Inserted,
                InsertOutcome::Kept
            ]
        );
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(&first_line));
        assert_eq!(content.lines().count(), 3);
        assert_eq!(store.get_history("SPY", d(3)).unwrap().unwrap(), set(3, 40));
        assert_eq!(store.get_history("SPY", d(4)).unwrap().unwrap(), set(4, 30));
    }

    #[test]
    fn forced_batch_rewrites_once_and_keeps_foreign_lines() {
        let (dir, store) = store();
        let seed: Vec<IndicatorSet> = (1..=5).map(|day| set(day, 40)).collect();
        store.insert_history_batch(&seed, WriteMode::InsertIfAbsent).unwrap();
        let path = dir.path().join("history/symbol=SPY/records.jsonl");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not json").unwrap();

        let forced = vec![set(2, 77), set(4, 78), set(6, 79)];
        let outcomes = store.insert_history_batch(&forced, WriteMode::Replace).unwrap();
        assert_eq!(
            outcomes,
            vec![InsertOutcome::Replaced, InsertOutcome::Replaced, InsertOutcome::Inserted]
        );

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 7);
        assert!(content.contains("{not json"));
        let records = store.history_range("SPY", d(1), d(31)).unwrap();
        let rsi: Vec<IndicatorValue> = records.iter().map(|s| s.rsi_14).collect();
        let expected: Vec<IndicatorValue> = [40, 77, 40, 78, 40, 79]
            .iter()
            .map(|v| IndicatorValue::Value(Decimal::new(*v, 0)))
            .collect();
        assert_eq!(rsi, expected);
    }

    #[test]
    fn poisoned_symbol_lock_is_permanent() {
        let (_dir, store) = store();
        let lock = store.lock_for("SPY").unwrap();
        let poisoner = std::thread::spawn(move || {
            let _held = lock.lock().unwrap();
            panic!("writer died mid-write");
        });
        assert!(poisoner.join().is_err());

        let err = store.insert_history(&set(2, 40), WriteMode::InsertIfAbsent).unwrap_err();
        assert!(matches!(err, StorageError::Poisoned(_)));
        assert!(!err.is_transient());
        let err = store.upsert_snapshot(&set(2, 40), UpsertGuard::NotOlder).unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn malformed_line_skipped() {
        let (dir, store) = store();
        store.insert_history(&set(2, 40), WriteMode::InsertIfAbsent).unwrap();
        let path = dir.path().join("history/symbol=SPY/records.jsonl");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not json").unwrap();

        assert_eq!(store.history_range("SPY", d(1), d(31)).unwrap().len(), 1);
    }

    #[test]
    fn path_like_symbol_rejected() {
        let (_dir, store) = store();
        let mut bad = set(2, 40);
        bad.symbol = "../evil".into();
        let err = store.insert_history(&bad, WriteMode::InsertIfAbsent).unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn health_check_creates_layout() {
        let (dir, store) = store();
        SnapshotStore::health_check(&store).unwrap();
        assert!(dir.path().join("snapshots").is_dir());
        assert!(dir.path().join("history").is_dir());
    }
}
