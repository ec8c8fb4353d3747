//! Cycle request, per-symbol outcomes, and the aggregate report.
//!
//! A cycle is a pure function of its request: no global "current run" state
//! exists anywhere. The orchestrator takes a `CycleRequest` and returns a
//! `CycleReport`.

use crate::scheduler::ScheduleMode;
use chrono::NaiveDate;
use screenlab_core::data::DataError;
use screenlab_core::domain::FieldId;
use screenlab_core::store::StorageError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// ── Request ─────────────────────────────────────────────────────────

/// Immutable description of one calculation cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleRequest {
    pub mode: ScheduleMode,
    /// Explicit symbols. `None` means the whole active universe.
    pub symbols: Option<Vec<String>>,
    /// Recompute and replace dates that already have history.
    pub force: bool,
    pub time_budget: Option<Duration>,
    /// Overrides the orchestrator's declared source.
    pub source: Option<String>,
    /// "Today" for the purpose of resolving an open daily target.
    pub as_of: NaiveDate,
}

impl CycleRequest {
    /// Daily cycle. `target = None` resolves to the newest raw date per symbol.
    pub fn daily(target: Option<NaiveDate>) -> Self {
        Self {
            mode: ScheduleMode::Daily { target },
            symbols: None,
            force: false,
            time_budget: None,
            source: None,
            as_of: chrono::Local::now().date_naive(),
        }
    }

    pub fn backfill(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            mode: ScheduleMode::Backfill { start, end },
            ..Self::daily(None)
        }
    }

    pub fn with_symbols(mut self, symbols: Vec<String>) -> Self {
        self.symbols = Some(symbols);
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = as_of;
        self
    }

    pub fn validate(&self) -> Result<(), CycleError> {
        if let ScheduleMode::Backfill { start, end } = self.mode {
            if start > end {
                return Err(CycleError::InvalidRequest(format!(
                    "backfill start {start} is after end {end}"
                )));
            }
        }
        if matches!(&self.symbols, Some(s) if s.is_empty()) {
            return Err(CycleError::InvalidRequest("empty symbol list".into()));
        }
        Ok(())
    }
}

// ── Outcomes ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// Every candidate date already has a history record.
    AlreadyRecorded,
    /// The provider holds no raw points for the requested range.
    NoRawData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    SourceMismatch { sources: Vec<String> },
    StorageWrite { message: String, transient: bool },
    Data(String),
}

impl FailureReason {
    pub fn from_data(err: &DataError) -> Self {
        match err {
            DataError::SourceMismatch { sources, .. } => FailureReason::SourceMismatch {
                sources: sources.clone(),
            },
            other => FailureReason::Data(other.to_string()),
        }
    }

    pub fn from_storage(err: &StorageError) -> Self {
        FailureReason::StorageWrite {
            message: err.to_string(),
            transient: err.is_transient(),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::SourceMismatch { sources } => {
                write!(f, "source mismatch: {}", sources.join(", "))
            }
            FailureReason::StorageWrite { message, transient } => {
                let class = if *transient { "transient" } else { "permanent" };
                write!(f, "storage write failed ({class}): {message}")
            }
            FailureReason::Data(message) => write!(f, "data error: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SymbolStatus {
    Succeeded,
    /// Written, but some fields of the newest record are not computed.
    Partial { missing: Vec<FieldId> },
    Failed(FailureReason),
    Skipped(SkipReason),
    /// Not started before the time budget ran out or the cycle was cancelled.
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolOutcome {
    pub symbol: String,
    pub status: SymbolStatus,
    pub records_written: usize,
    pub records_skipped: usize,
    /// The snapshot was re-pointed at the newest history record.
    pub reconciled: bool,
}

impl SymbolOutcome {
    pub fn new(symbol: impl Into<String>, status: SymbolStatus) -> Self {
        Self {
            symbol: symbol.into(),
            status,
            records_written: 0,
            records_skipped: 0,
            reconciled: false,
        }
    }

    pub fn deferred(symbol: impl Into<String>) -> Self {
        Self::new(symbol, SymbolStatus::Deferred)
    }
}

// ── Report ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolFailure {
    pub symbol: String,
    pub reason: FailureReason,
}

/// Aggregate result of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub succeeded: Vec<String>,
    pub partial: Vec<String>,
    pub failed: Vec<SymbolFailure>,
    pub skipped: Vec<String>,
    pub deferred: Vec<String>,
    pub records_written: usize,
    pub records_skipped: usize,
    pub reconciled: usize,
    pub elapsed: Duration,
    /// Per-symbol detail, in request order.
    pub outcomes: Vec<SymbolOutcome>,
}

impl CycleReport {
    pub fn from_outcomes(outcomes: Vec<SymbolOutcome>, elapsed: Duration) -> Self {
        let mut report = CycleReport {
            succeeded: Vec::new(),
            partial: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            deferred: Vec::new(),
            records_written: 0,
            records_skipped: 0,
            reconciled: 0,
            elapsed,
            outcomes: Vec::new(),
        };

        for outcome in &outcomes {
            report.records_written += outcome.records_written;
            report.records_skipped += outcome.records_skipped;
            if outcome.reconciled {
                report.reconciled += 1;
            }
            let symbol = outcome.symbol.clone();
            match &outcome.status {
                SymbolStatus::Succeeded => report.succeeded.push(symbol),
                SymbolStatus::Partial { .. } => report.partial.push(symbol),
                SymbolStatus::Failed(reason) => report.failed.push(SymbolFailure {
                    symbol,
                    reason: reason.clone(),
                }),
                SymbolStatus::Skipped(_) => report.skipped.push(symbol),
                SymbolStatus::Deferred => report.deferred.push(symbol),
            }
        }
        report.outcomes = outcomes;
        report
    }

    /// No failures and nothing deferred.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.deferred.is_empty()
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn outcome(&self, symbol: &str) -> Option<&SymbolOutcome> {
        self.outcomes.iter().find(|o| o.symbol == symbol)
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} symbols in {:.2}s: {} succeeded, {} partial, {} failed, {} skipped, {} deferred",
            self.total(),
            self.elapsed.as_secs_f64(),
            self.succeeded.len(),
            self.partial.len(),
            self.failed.len(),
            self.skipped.len(),
            self.deferred.len(),
        )?;
        write!(
            f,
            "records written: {}, already present: {}, snapshots reconciled: {}",
            self.records_written, self.records_skipped, self.reconciled
        )?;
        for failure in &self.failed {
            write!(f, "\n  FAILED {}: {}", failure.symbol, failure.reason)?;
        }
        Ok(())
    }
}

/// Errors that abort a cycle before any symbol is attempted.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("storage health check failed: {0}")]
    HealthCheck(StorageError),

    #[error("cannot list symbol universe: {0}")]
    Universe(DataError),

    #[error("worker pool: {0}")]
    Pool(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
