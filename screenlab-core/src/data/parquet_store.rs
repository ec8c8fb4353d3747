//! Parquet price store with Hive-style partitioning.
//!
//! Layout: `{root}/symbol={SYMBOL}/{year}.parquet`
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place)
//! - Merge on write: new points replace existing (date, source) pairs
//! - OHLC sanity check on write
//! - Integrity validation on load (schema check, row count > 0); a corrupt
//!   year fails the whole load and the file is left in place for ingestion
//! - Metadata sidecar per symbol (hash, date range, sources)

use super::provider::{validate_symbol, DataError, PriceSeriesProvider, SymbolUniverse};
use crate::domain::PricePoint;
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Metadata sidecar for a stored symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMeta {
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub point_count: usize,
    pub data_hash: String,
    pub sources: Vec<String>,
    pub written_at: chrono::NaiveDateTime,
}

/// Storage status for a single symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceStatus {
    pub symbol: String,
    pub stored: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub point_count: Option<usize>,
}

/// Raw price series persisted as Parquet.
pub struct ParquetPriceStore {
    root: PathBuf,
}

impl ParquetPriceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/symbol={SYMBOL}/`
    fn symbol_dir(&self, symbol: &str) -> PathBuf {
        self.root.join(format!("symbol={symbol}"))
    }

    fn year_path(&self, symbol: &str, year: i32) -> PathBuf {
        self.symbol_dir(symbol).join(format!("{year}.parquet"))
    }

    fn meta_path(&self, symbol: &str) -> PathBuf {
        self.symbol_dir(symbol).join("meta.json")
    }

    /// Merge points for a symbol into the store.
    ///
    /// Groups by year and rewrites every touched year partition atomically.
    pub fn write(&self, symbol: &str, points: &[PricePoint]) -> Result<(), DataError> {
        validate_symbol(symbol)?;
        if points.is_empty() {
            return Err(DataError::ValidationError("no points to store".into()));
        }
        if let Some(p) = points.iter().find(|p| p.symbol != symbol) {
            return Err(DataError::ValidationError(format!(
                "point for {} passed to write({symbol})",
                p.symbol
            )));
        }
        if let Some(p) = points.iter().find(|p| !p.is_sane()) {
            return Err(DataError::ValidationError(format!(
                "{symbol} {}: OHLC values fail sanity check",
                p.date
            )));
        }

        let sym_dir = self.symbol_dir(symbol);
        fs::create_dir_all(&sym_dir)
            .map_err(|e| DataError::ParquetError(format!("failed to create dir: {e}")))?;

        let touched: BTreeSet<i32> = points.iter().map(|p| p.date.year()).collect();

        let mut merged: BTreeMap<(NaiveDate, String), PricePoint> = match self.load(symbol) {
            Ok(existing) => existing
                .into_iter()
                .map(|p| ((p.date, p.source.clone()), p))
                .collect(),
            Err(DataError::SymbolNotFound { .. }) => BTreeMap::new(),
            Err(e) => return Err(e),
        };
        for p in points {
            merged.insert((p.date, p.source.clone()), p.clone());
        }

        let mut by_year: BTreeMap<i32, Vec<&PricePoint>> = BTreeMap::new();
        for p in merged.values() {
            by_year.entry(p.date.year()).or_default().push(p);
        }

        for year in &touched {
            let Some(year_points) = by_year.get(year) else {
                continue;
            };
            let df = points_to_dataframe(year_points)?;
            let path = self.year_path(symbol, *year);
            let tmp_path = path.with_extension("parquet.tmp");

            write_parquet(&df, &tmp_path)?;

            fs::rename(&tmp_path, &path).map_err(|e| {
                let _ = fs::remove_file(&tmp_path);
                DataError::ParquetError(format!("atomic rename failed: {e}"))
            })?;
        }

        let all: Vec<&PricePoint> = merged.values().collect();
        self.write_meta(symbol, &all)?;
        debug!(symbol, points = points.len(), years = touched.len(), "stored price points");
        Ok(())
    }

    fn write_meta(&self, symbol: &str, points: &[&PricePoint]) -> Result<(), DataError> {
        let (Some(first), Some(last)) = (points.first(), points.last()) else {
            return Ok(());
        };
        let sources: BTreeSet<&str> = points.iter().map(|p| p.source.as_str()).collect();
        let meta = StoreMeta {
            symbol: symbol.to_string(),
            start_date: first.date,
            end_date: last.date,
            point_count: points.len(),
            data_hash: blake3::hash(
                &serde_json::to_vec(points)
                    .map_err(|e| DataError::Other(format!("hash serialization: {e}")))?,
            )
            .to_hex()
            .to_string(),
            sources: sources.into_iter().map(String::from).collect(),
            written_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| DataError::Other(format!("meta serialization: {e}")))?;
        fs::write(self.meta_path(symbol), meta_json)
            .map_err(|e| DataError::ParquetError(format!("meta write: {e}")))
    }

    /// Load all stored points for a symbol, sorted by date ascending.
    ///
    /// Any year file that fails validation fails the load. Returning the other
    /// years would hand out windows that silently skip the missing span.
    pub fn load(&self, symbol: &str) -> Result<Vec<PricePoint>, DataError> {
        validate_symbol(symbol)?;
        let sym_dir = self.symbol_dir(symbol);
        if !sym_dir.exists() {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }

        let mut all_points = Vec::new();
        let entries =
            fs::read_dir(&sym_dir).map_err(|e| DataError::ParquetError(format!("read dir: {e}")))?;

        for entry in entries {
            let entry = entry.map_err(|e| DataError::ParquetError(format!("dir entry: {e}")))?;
            let path = entry.path();

            // Skip meta.json, .tmp
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }

            let points = load_and_validate_parquet(&path, symbol).map_err(|e| {
                warn!(path = %path.display(), error = %e, "corrupt price partition");
                DataError::CorruptPartition {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                }
            })?;
            all_points.extend(points);
        }

        if all_points.is_empty() {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }

        all_points.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.source.cmp(&b.source)));
        Ok(all_points)
    }

    pub fn get_meta(&self, symbol: &str) -> Option<StoreMeta> {
        let content = fs::read_to_string(self.meta_path(symbol)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Symbols with a partition directory, sorted.
    pub fn symbols(&self) -> Result<Vec<String>, DataError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.root)
            .map_err(|e| DataError::ParquetError(format!("read dir: {e}")))?;
        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DataError::ParquetError(format!("dir entry: {e}")))?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(sym) = entry.file_name().to_str().and_then(|n| n.strip_prefix("symbol=")) {
                symbols.push(sym.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }

    pub fn status(&self, symbols: &[&str]) -> Vec<PriceStatus> {
        symbols
            .iter()
            .map(|sym| {
                let meta = self.get_meta(sym);
                PriceStatus {
                    symbol: sym.to_string(),
                    stored: meta.is_some(),
                    start_date: meta.as_ref().map(|m| m.start_date),
                    end_date: meta.as_ref().map(|m| m.end_date),
                    point_count: meta.as_ref().map(|m| m.point_count),
                }
            })
            .collect()
    }
}

impl PriceSeriesProvider for ParquetPriceStore {
    fn name(&self) -> &str {
        "parquet"
    }

    fn get_price_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        source: Option<&str>,
    ) -> Result<Vec<PricePoint>, DataError> {
        let points = match self.load(symbol) {
            Ok(points) => points,
            Err(DataError::SymbolNotFound { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(points
            .into_iter()
            .filter(|p| p.date >= start && p.date <= end)
            .filter(|p| source.map_or(true, |s| p.source == s))
            .collect())
    }
}

impl SymbolUniverse for ParquetPriceStore {
    fn list_active_symbols(&self) -> Result<Vec<String>, DataError> {
        self.symbols()
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn points_to_dataframe(points: &[&PricePoint]) -> Result<DataFrame, DataError> {
    let dates: Vec<i32> = points
        .iter()
        .map(|p| p.date.num_days_from_ce() - EPOCH_DAYS_FROM_CE)
        .collect();
    let opens: Vec<f64> = points.iter().map(|p| p.open).collect();
    let highs: Vec<f64> = points.iter().map(|p| p.high).collect();
    let lows: Vec<f64> = points.iter().map(|p| p.low).collect();
    let closes: Vec<f64> = points.iter().map(|p| p.close).collect();
    let volumes: Vec<u64> = points.iter().map(|p| p.volume).collect();
    let sources: Vec<String> = points.iter().map(|p| p.source.clone()).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| DataError::ParquetError(format!("date cast: {e}")))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
        Column::new("source".into(), sources),
    ])
    .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), DataError> {
    let file =
        fs::File::create(path).map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    Ok(())
}

const EXPECTED_COLUMNS: [&str; 7] = ["date", "open", "high", "low", "close", "volume", "source"];

fn load_and_validate_parquet(path: &Path, symbol: &str) -> Result<Vec<PricePoint>, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::ParquetError(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(DataError::ValidationError("empty parquet file".into()));
    }
    for col_name in &EXPECTED_COLUMNS {
        if df.column(col_name).is_err() {
            return Err(DataError::ValidationError(format!(
                "missing column '{col_name}'"
            )));
        }
    }

    dataframe_to_points(&df, symbol)
}

fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column, DataError> {
    df.column(name)
        .map_err(|e| DataError::ParquetError(format!("column read: {e}")))
}

fn dataframe_to_points(df: &DataFrame, symbol: &str) -> Result<Vec<PricePoint>, DataError> {
    let type_err = |name: &str, e: PolarsError| {
        DataError::ParquetError(format!("{name} column type: {e}"))
    };

    let date_ca = column(df, "date")?.date().map_err(|e| type_err("date", e))?;
    let open_ca = column(df, "open")?.f64().map_err(|e| type_err("open", e))?;
    let high_ca = column(df, "high")?.f64().map_err(|e| type_err("high", e))?;
    let low_ca = column(df, "low")?.f64().map_err(|e| type_err("low", e))?;
    let close_ca = column(df, "close")?.f64().map_err(|e| type_err("close", e))?;
    let vol_ca = column(df, "volume")?.u64().map_err(|e| type_err("volume", e))?;
    let source_ca = column(df, "source")?.str().map_err(|e| type_err("source", e))?;

    let n = df.height();
    let mut points = Vec::with_capacity(n);

    for i in 0..n {
        let date_days = date_ca
            .get(i)
            .ok_or_else(|| DataError::ParquetError(format!("null date at row {i}")))?;
        let date = NaiveDate::from_num_days_from_ce_opt(date_days + EPOCH_DAYS_FROM_CE)
            .ok_or_else(|| DataError::ParquetError(format!("date out of range at row {i}")))?;
        let source = source_ca
            .get(i)
            .ok_or_else(|| DataError::ParquetError(format!("null source at row {i}")))?;

        points.push(PricePoint {
            symbol: symbol.to_string(),
            date,
            open: open_ca.get(i).unwrap_or(f64::NAN),
            high: high_ca.get(i).unwrap_or(f64::NAN),
            low: low_ca.get(i).unwrap_or(f64::NAN),
            close: close_ca.get(i).unwrap_or(f64::NAN),
            volume: vol_ca.get(i).unwrap_or(0),
            source: source.to_string(),
        });
    }

    Ok(points)
}
