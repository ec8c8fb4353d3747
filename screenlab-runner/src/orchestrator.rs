//! Batch orchestrator — one calculation cycle across the symbol universe.
//!
//! Each symbol is processed in isolation on a bounded rayon pool:
//! fetch series → plan targets → compute every target → one history batch →
//! snapshot. A symbol's
//! failure is recorded in its outcome and never aborts the cycle. The time
//! budget and the cancel flag are checked before each symbol starts; symbols
//! already in flight finish and persist.

use crate::config::ScreenConfig;
use crate::cycle::{
    CycleError, CycleReport, CycleRequest, FailureReason, SkipReason, SymbolOutcome, SymbolStatus,
};
use crate::retry::{with_retry, RetryPolicy};
use crate::scheduler::IncrementalScheduler;
use rayon::prelude::*;
use screenlab_core::data::{PriceSeriesProvider, SymbolUniverse};
use screenlab_core::domain::IndicatorSet;
use screenlab_core::engine::{IndicatorEngine, PriceSeries, Window, WindowBuilder};
use screenlab_core::fingerprint::window_hash;
use screenlab_core::store::{
    HistoryStore, SnapshotStore, StorageError, UpsertGuard, UpsertOutcome, WriteMode,
};
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

pub struct BatchOrchestrator {
    provider: Arc<dyn PriceSeriesProvider>,
    engine: Arc<IndicatorEngine>,
    snapshots: Arc<dyn SnapshotStore>,
    history: Arc<dyn HistoryStore>,
    universe: Arc<dyn SymbolUniverse>,
    workers: usize,
    retry: RetryPolicy,
    default_source: Option<String>,
}

impl BatchOrchestrator {
    pub fn new(
        provider: Arc<dyn PriceSeriesProvider>,
        snapshots: Arc<dyn SnapshotStore>,
        history: Arc<dyn HistoryStore>,
        universe: Arc<dyn SymbolUniverse>,
    ) -> Self {
        Self {
            provider,
            engine: Arc::new(IndicatorEngine::default()),
            snapshots,
            history,
            universe,
            workers: 4,
            retry: RetryPolicy::default(),
            default_source: None,
        }
    }

    /// Apply engine, batch, retry, and source settings from a loaded config.
    pub fn from_config(
        config: &ScreenConfig,
        provider: Arc<dyn PriceSeriesProvider>,
        snapshots: Arc<dyn SnapshotStore>,
        history: Arc<dyn HistoryStore>,
        universe: Arc<dyn SymbolUniverse>,
    ) -> Self {
        Self::new(provider, snapshots, history, universe)
            .with_engine(Arc::new(IndicatorEngine::new(config.engine_params())))
            .with_workers(config.batch.workers)
            .with_retry(config.retry_policy())
            .with_default_source(config.data.default_source.clone())
    }

    pub fn with_engine(mut self, engine: Arc<IndicatorEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_default_source(mut self, source: Option<String>) -> Self {
        self.default_source = source;
        self
    }

    pub fn engine(&self) -> &Arc<IndicatorEngine> {
        &self.engine
    }

    #[instrument(skip_all, fields(mode = ?request.mode, force = request.force))]
    pub fn run_calculation_cycle(&self, request: &CycleRequest) -> Result<CycleReport, CycleError> {
        self.run_with_cancel(request, None)
    }

    /// Run a cycle that stops scheduling new symbols once `cancel` is set.
    pub fn run_with_cancel(
        &self,
        request: &CycleRequest,
        cancel: Option<&AtomicBool>,
    ) -> Result<CycleReport, CycleError> {
        request.validate()?;
        let started = Instant::now();
        let deadline = request.time_budget.and_then(|b| started.checked_add(b));

        self.snapshots.health_check().map_err(CycleError::HealthCheck)?;
        self.history.health_check().map_err(CycleError::HealthCheck)?;

        let symbols = self.resolve_symbols(request)?;
        let source = request.source.clone().or_else(|| self.default_source.clone());
        let builder = WindowBuilder::new(Arc::clone(&self.provider)).with_source(source);
        let scheduler = IncrementalScheduler::new(Arc::clone(&self.history));

        info!(
            symbols = symbols.len(),
            workers = self.workers,
            provider = builder.provider_name(),
            "starting calculation cycle"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| CycleError::Pool(e.to_string()))?;

        let outcomes: Vec<SymbolOutcome> = pool.install(|| {
            symbols
                .par_iter()
                .map(|symbol| {
                    let expired = deadline.is_some_and(|d| Instant::now() >= d);
                    if expired || cancel.is_some_and(|f| f.load(Ordering::Relaxed)) {
                        debug!(symbol = %symbol, "deferred");
                        return SymbolOutcome::deferred(symbol.clone());
                    }
                    self.process_symbol(symbol, &builder, &scheduler, request)
                })
                .collect()
        });

        let report = CycleReport::from_outcomes(outcomes, started.elapsed());
        info!(
            succeeded = report.succeeded.len(),
            partial = report.partial.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            deferred = report.deferred.len(),
            records_written = report.records_written,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "calculation cycle finished"
        );
        Ok(report)
    }

    /// Request symbols, or the active universe; duplicates dropped, order kept.
    fn resolve_symbols(&self, request: &CycleRequest) -> Result<Vec<String>, CycleError> {
        let listed = match &request.symbols {
            Some(symbols) => symbols.clone(),
            None => self
                .universe
                .list_active_symbols()
                .map_err(CycleError::Universe)?,
        };
        let mut seen = HashSet::new();
        Ok(listed.into_iter().filter(|s| seen.insert(s.clone())).collect())
    }

    // ── Per-symbol task ─────────────────────────────────────────────

    fn process_symbol(
        &self,
        symbol: &str,
        builder: &WindowBuilder,
        scheduler: &IncrementalScheduler,
        request: &CycleRequest,
    ) -> SymbolOutcome {
        let (start, end) = request.mode.query_range(request.as_of);
        let mut series = match builder.fetch_series(symbol, start, end) {
            Ok(series) => series,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "cannot build windows");
                return SymbolOutcome::new(symbol, SymbolStatus::Failed(FailureReason::from_data(&e)));
            }
        };

        let plan = match scheduler.plan(symbol, &series, &request.mode, request.as_of, request.force) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "cannot read history");
                return SymbolOutcome::new(symbol, SymbolStatus::Failed(FailureReason::from_storage(&e)));
            }
        };

        if plan.is_empty() {
            let reason = if plan.already_recorded > 0 {
                SkipReason::AlreadyRecorded
            } else {
                debug!(symbol = %symbol, "no raw data for requested dates");
                SkipReason::NoRawData
            };
            let mut outcome = SymbolOutcome::new(symbol, SymbolStatus::Skipped(reason));
            outcome.records_skipped = plan.already_recorded;
            match self.sync_snapshot(symbol) {
                Ok(reconciled) => outcome.reconciled = reconciled,
                Err(e) => {
                    error!(symbol = %symbol, error = %e, "snapshot reconciliation failed");
                    outcome.status = SymbolStatus::Failed(FailureReason::from_storage(&e));
                }
            }
            return outcome;
        }

        // A daily target can sit before the fetched range; widen so its
        // window gets the full lookback.
        if let Some(&first) = plan.targets.first() {
            if first < start {
                series = match builder.fetch_series(symbol, first, end) {
                    Ok(wider) => wider,
                    Err(e) => {
                        return SymbolOutcome::new(
                            symbol,
                            SymbolStatus::Failed(FailureReason::from_data(&e)),
                        )
                    }
                };
            }
        }

        self.compute_and_persist(symbol, &series, &plan.targets, request.force, plan.already_recorded)
    }

    fn compute_and_persist(
        &self,
        symbol: &str,
        series: &PriceSeries,
        targets: &[chrono::NaiveDate],
        force: bool,
        already_recorded: usize,
    ) -> SymbolOutcome {
        let mode = if force {
            WriteMode::Replace
        } else {
            WriteMode::InsertIfAbsent
        };
        let mut outcome = SymbolOutcome::new(symbol, SymbolStatus::Succeeded);
        outcome.records_skipped = already_recorded;

        // Every window is checked before anything is written, so a symbol
        // with a mixed-source window leaves no rows behind.
        let mut sets = Vec::with_capacity(targets.len());
        for &target in targets {
            match series.window_at(target) {
                Ok(Some(window)) => sets.push(self.compute_guarded(&window)),
                Ok(None) => {}
                Err(e) => {
                    warn!(symbol = %symbol, date = %target, error = %e, "cannot build window");
                    outcome.status = SymbolStatus::Failed(FailureReason::from_data(&e));
                    return outcome;
                }
            }
        }

        match with_retry(&self.retry, "history insert", || {
            self.history.insert_history_batch(&sets, mode)
        }) {
            Ok(inserted) => {
                let written = inserted.iter().filter(|o| o.wrote()).count();
                outcome.records_written += written;
                outcome.records_skipped += inserted.len() - written;
            }
            Err(e) => {
                error!(symbol = %symbol, records = sets.len(), error = %e, "history write failed");
                outcome.status = SymbolStatus::Failed(FailureReason::from_storage(&e));
                return outcome;
            }
        }
        let newest = sets.pop();

        if let Err(e) = self.sync_snapshot(symbol) {
            error!(symbol = %symbol, error = %e, "snapshot write failed");
            outcome.status = SymbolStatus::Failed(FailureReason::from_storage(&e));
            return outcome;
        }

        if let Some(set) = newest {
            let missing = set.missing_fields();
            if !missing.is_empty() {
                debug!(symbol = %symbol, date = %set.calculated_date, missing = missing.len(), "partial indicator set");
                outcome.status = SymbolStatus::Partial { missing };
            }
        }
        debug!(symbol = %symbol, written = outcome.records_written, "symbol done");
        outcome
    }

    /// Run the engine, turning a panic into an all-not-computed set.
    fn compute_guarded(&self, window: &Window) -> IndicatorSet {
        match panic::catch_unwind(AssertUnwindSafe(|| self.engine.compute_with_diagnostics(window))) {
            Ok(output) => {
                if !output.undefined_fields.is_empty() {
                    debug!(
                        symbol = %window.symbol,
                        date = %window.target_date,
                        fields = ?output.undefined_fields,
                        "undefined indicator values"
                    );
                }
                output.set
            }
            Err(payload) => {
                error!(
                    symbol = %window.symbol,
                    date = %window.target_date,
                    panic = panic_message(payload.as_ref()),
                    "indicator computation panicked"
                );
                let mut set = IndicatorSet::empty(&window.symbol, window.target_date, &window.source);
                set.window_len = window.len();
                set.window_hash = window_hash(&window.points);
                set
            }
        }
    }

    /// Point the snapshot at the newest history record if it differs.
    /// Returns whether a write happened.
    fn sync_snapshot(&self, symbol: &str) -> Result<bool, StorageError> {
        let Some(latest) = self.history.latest_history(symbol)? else {
            return Ok(false);
        };
        if self.snapshots.get_snapshot(symbol)?.as_ref() == Some(&latest) {
            return Ok(false);
        }
        let outcome = with_retry(&self.retry, "snapshot upsert", || {
            self.snapshots.upsert_snapshot(&latest, UpsertGuard::NotOlder)
        })?;
        match outcome {
            UpsertOutcome::Written => Ok(true),
            UpsertOutcome::Rejected { existing } => {
                debug!(symbol = %symbol, existing = %existing, "snapshot already newer");
                Ok(false)
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
