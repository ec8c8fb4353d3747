//! Incremental scheduling: which (symbol, date) pairs still need computing.
//!
//! The scheduler never computes anything. It compares the raw dates a series
//! offers against the dates already in history and hands back the difference.

use chrono::NaiveDate;
use screenlab_core::engine::PriceSeries;
use screenlab_core::store::{HistoryStore, StorageError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// How a cycle picks its calculation dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleMode {
    /// One date per symbol: the last raw date on or before `target`
    /// (or on or before the cycle's as-of date when `target` is `None`).
    Daily { target: Option<NaiveDate> },
    /// Every raw date inside `[start, end]`.
    Backfill { start: NaiveDate, end: NaiveDate },
}

impl ScheduleMode {
    /// Raw-date range the mode can draw targets from.
    pub fn query_range(&self, as_of: NaiveDate) -> (NaiveDate, NaiveDate) {
        match *self {
            ScheduleMode::Daily { target } => {
                let t = target.unwrap_or(as_of);
                (t, t)
            }
            ScheduleMode::Backfill { start, end } => (start, end),
        }
    }

    pub fn is_backfill(&self) -> bool {
        matches!(self, ScheduleMode::Backfill { .. })
    }
}

/// Dates to compute for one symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolPlan {
    pub symbol: String,
    /// Ascending.
    pub targets: Vec<NaiveDate>,
    /// Candidates dropped because history already holds them.
    pub already_recorded: usize,
}

impl SymbolPlan {
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

pub struct IncrementalScheduler {
    history: Arc<dyn HistoryStore>,
}

impl IncrementalScheduler {
    pub fn new(history: Arc<dyn HistoryStore>) -> Self {
        Self { history }
    }

    /// Candidate dates offered by `series` under `mode`, before any diffing.
    pub fn candidates(series: &PriceSeries, mode: &ScheduleMode, as_of: NaiveDate) -> Vec<NaiveDate> {
        match *mode {
            ScheduleMode::Daily { target } => series
                .last_date_on_or_before(target.unwrap_or(as_of))
                .into_iter()
                .collect(),
            ScheduleMode::Backfill { start, end } => series.dates_in(start, end),
        }
    }

    /// Diff candidates against history. Under `force` every candidate is a target.
    pub fn plan(
        &self,
        symbol: &str,
        series: &PriceSeries,
        mode: &ScheduleMode,
        as_of: NaiveDate,
        force: bool,
    ) -> Result<SymbolPlan, StorageError> {
        let candidates = Self::candidates(series, mode, as_of);
        let (Some(&first), Some(&last)) = (candidates.first(), candidates.last()) else {
            return Ok(SymbolPlan {
                symbol: symbol.to_string(),
                targets: Vec::new(),
                already_recorded: 0,
            });
        };

        if force {
            return Ok(SymbolPlan {
                symbol: symbol.to_string(),
                targets: candidates,
                already_recorded: 0,
            });
        }

        let recorded = self.history.recorded_dates(symbol, first, last)?;
        let total = candidates.len();
        let targets: Vec<NaiveDate> = candidates
            .into_iter()
            .filter(|d| !recorded.contains(d))
            .collect();
        let already_recorded = total - targets.len();
        if already_recorded > 0 {
            debug!(symbol = %symbol, skipped = already_recorded, "dates already in history");
        }

        Ok(SymbolPlan {
            symbol: symbol.to_string(),
            targets,
            already_recorded,
        })
    }
}
