//! Read-time fallback for symbols whose snapshot is missing or stale.
//!
//! `resolve` decides between the stored snapshot and an on-demand computation
//! and never writes. `try_cache_fill` is the separate, failure-tolerant write
//! through to the snapshot store; it uses the strict guard, so a batch row of
//! the same or a newer date always wins.

use chrono::{Duration as DateDuration, NaiveDate};
use screenlab_core::data::DataError;
use screenlab_core::domain::IndicatorSet;
use screenlab_core::engine::{IndicatorEngine, WindowBuilder};
use screenlab_core::store::{SnapshotStore, StorageError, UpsertGuard, UpsertOutcome};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("no indicators available for {symbol}")]
    NotFound { symbol: String },

    #[error("fallback for {symbol} timed out after {waited:?}")]
    Timeout { symbol: String, waited: Duration },

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("fallback worker: {0}")]
    Worker(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOrigin {
    /// Served from the snapshot store.
    Snapshot,
    /// Computed on demand from raw data.
    Computed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub set: IndicatorSet,
    pub origin: ResolutionOrigin,
    /// The served set trails raw data by more than the staleness margin, or
    /// raw data could not be read to verify its freshness.
    pub stale: bool,
}

impl Resolution {
    fn snapshot(set: IndicatorSet, stale: bool) -> Self {
        Self {
            set,
            origin: ResolutionOrigin::Snapshot,
            stale,
        }
    }
}

#[derive(Clone)]
pub struct FallbackResolver {
    builder: WindowBuilder,
    engine: Arc<IndicatorEngine>,
    snapshots: Arc<dyn SnapshotStore>,
    staleness: DateDuration,
    timeout: Duration,
    cache_fill: bool,
}

impl FallbackResolver {
    pub fn new(
        builder: WindowBuilder,
        engine: Arc<IndicatorEngine>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            builder,
            engine,
            snapshots,
            staleness: DateDuration::days(3),
            timeout: Duration::from_secs(2),
            cache_fill: true,
        }
    }

    pub fn with_staleness(mut self, staleness: DateDuration) -> Self {
        self.staleness = staleness;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cache_fill(mut self, enabled: bool) -> Self {
        self.cache_fill = enabled;
        self
    }

    pub fn cache_fill_enabled(&self) -> bool {
        self.cache_fill
    }

    /// Snapshot if fresh, otherwise an on-demand computation.
    ///
    /// When the computation fails or times out and a snapshot exists, the
    /// snapshot is served flagged `stale`.
    pub fn resolve(&self, symbol: &str) -> Result<Resolution, FallbackError> {
        let snapshot = match self.snapshots.get_snapshot(symbol) {
            Ok(s) => s,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "snapshot read failed; treating as missing");
                None
            }
        };

        let latest_raw = match self.builder.latest_raw_date(symbol) {
            Ok(d) => d,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "cannot read raw data; freshness unverified");
                return match snapshot {
                    Some(set) => Ok(Resolution::snapshot(set, true)),
                    None => Err(e.into()),
                };
            }
        };

        let Some(raw_date) = latest_raw else {
            return snapshot
                .map(|set| Resolution::snapshot(set, false))
                .ok_or_else(|| FallbackError::NotFound {
                    symbol: symbol.to_string(),
                });
        };

        if let Some(set) = &snapshot {
            if raw_date - set.calculated_date <= self.staleness {
                return Ok(Resolution::snapshot(set.clone(), false));
            }
            debug!(symbol = %symbol, snapshot = %set.calculated_date, raw = %raw_date, "snapshot stale");
        }

        match self.compute_with_timeout(symbol, raw_date) {
            Ok(set) => {
                info!(symbol = %symbol, date = %set.calculated_date, "served on-demand computation");
                Ok(Resolution {
                    set,
                    origin: ResolutionOrigin::Computed,
                    stale: false,
                })
            }
            Err(e) => match snapshot {
                Some(set) => {
                    warn!(symbol = %symbol, error = %e, "fallback failed; serving stale snapshot");
                    Ok(Resolution::snapshot(set, true))
                }
                None => Err(e),
            },
        }
    }

    /// Write a computed set through to the snapshot store. Never fails the
    /// caller; returns whether the row was written.
    pub fn try_cache_fill(&self, set: &IndicatorSet) -> bool {
        match self.snapshots.upsert_snapshot(set, UpsertGuard::StrictlyNewer) {
            Ok(UpsertOutcome::Written) => true,
            Ok(UpsertOutcome::Rejected { existing }) => {
                debug!(symbol = %set.symbol, existing = %existing, "cache fill skipped; stored row not older");
                false
            }
            Err(e) => {
                warn!(symbol = %set.symbol, error = %e, "cache fill failed");
                false
            }
        }
    }

    /// Build and compute on a helper thread, waiting at most `timeout`.
    fn compute_with_timeout(&self, symbol: &str, target: NaiveDate) -> Result<IndicatorSet, FallbackError> {
        let (tx, rx) = mpsc::channel();
        let builder = self.builder.clone();
        let engine = Arc::clone(&self.engine);
        let owned = symbol.to_string();

        thread::Builder::new()
            .name(format!("fallback-{symbol}"))
            .spawn(move || {
                let result = builder
                    .build(&owned, target)
                    .map(|window| window.map(|w| engine.compute(&w)));
                // The receiver is gone once the caller timed out.
                let _ = tx.send(result);
            })
            .map_err(|e| FallbackError::Worker(e.to_string()))?;

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(Some(set))) => Ok(set),
            Ok(Ok(None)) => Err(FallbackError::NotFound {
                symbol: symbol.to_string(),
            }),
            Ok(Err(e)) => Err(e.into()),
            Err(RecvTimeoutError::Timeout) => Err(FallbackError::Timeout {
                symbol: symbol.to_string(),
                waited: self.timeout,
            }),
            Err(RecvTimeoutError::Disconnected) => {
                Err(FallbackError::Worker("computation thread panicked".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use screenlab_core::data::{MemoryPriceProvider, PriceSeriesProvider};
    use screenlab_core::domain::{FieldId, PricePoint};
    use screenlab_core::store::MemoryStore;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap() + DateDuration::days(offset)
    }

    fn points(n: usize, source: &str) -> Vec<PricePoint> {
        (0..n)
            .map(|i| PricePoint {
                symbol: "AAA".into(),
                date: day(i as i64),
                open: 50.0,
                high: 51.0,
                low: 49.0,
                close: 50.0 + (i % 7) as f64,
                volume: 500,
                source: source.into(),
            })
            .collect()
    }

    fn resolver(points: Vec<PricePoint>, store: Arc<MemoryStore>) -> FallbackResolver {
        let builder = WindowBuilder::new(Arc::new(MemoryPriceProvider::with_series(points)));
        FallbackResolver::new(builder, Arc::new(IndicatorEngine::default()), store)
            .with_timeout(Duration::from_secs(10))
    }

    #[test]
    fn missing_snapshot_computes_on_demand() {
        let store = Arc::new(MemoryStore::new());
        let r = resolver(points(40, "test"), store.clone());
        let res = r.resolve("AAA").unwrap();
        assert_eq!(res.origin, ResolutionOrigin::Computed);
        assert_eq!(res.set.calculated_date, day(39));
        assert!(res.set.get(FieldId::Sma20).is_computed());
        // resolve never writes
        assert!(store.get_snapshot("AAA").unwrap().is_none());
    }

    #[test]
    fn fresh_snapshot_served_as_is() {
        let store = Arc::new(MemoryStore::new());
        let stored = IndicatorSet::empty("AAA", day(38), "test");
        store.upsert_snapshot(&stored, UpsertGuard::NotOlder).unwrap();
        let r = resolver(points(40, "test"), store);
        let res = r.resolve("AAA").unwrap();
        assert_eq!(res.origin, ResolutionOrigin::Snapshot);
        assert_eq!(res.set, stored);
        assert!(!res.stale);
    }

    #[test]
    fn stale_snapshot_triggers_recompute() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_snapshot(&IndicatorSet::empty("AAA", day(10), "test"), UpsertGuard::NotOlder)
            .unwrap();
        let r = resolver(points(40, "test"), store);
        let res = r.resolve("AAA").unwrap();
        assert_eq!(res.origin, ResolutionOrigin::Computed);
        assert_eq!(res.set.calculated_date, day(39));
    }

    #[test]
    fn stale_snapshot_served_when_computation_fails() {
        let store = Arc::new(MemoryStore::new());
        let stored = IndicatorSet::empty("AAA", day(10), "test");
        store.upsert_snapshot(&stored, UpsertGuard::NotOlder).unwrap();
        let mut mixed = points(40, "vendor_a");
        mixed[30].source = "vendor_b".into();
        let res = resolver(mixed, store).resolve("AAA").unwrap();
        assert_eq!(res.origin, ResolutionOrigin::Snapshot);
        assert!(res.stale);
        assert_eq!(res.set, stored);
    }

    struct OfflineProvider;

    impl PriceSeriesProvider for OfflineProvider {
        fn name(&self) -> &str {
            "offline"
        }

        fn get_price_series(
            &self,
            _symbol: &str,
            _start: NaiveDate,
            _end: NaiveDate,
            _source: Option<&str>,
        ) -> Result<Vec<PricePoint>, DataError> {
            Err(DataError::Unavailable("raw database offline".into()))
        }

        fn latest_date(&self, _symbol: &str, _source: Option<&str>) -> Result<Option<NaiveDate>, DataError> {
            Err(DataError::Unavailable("raw database offline".into()))
        }
    }

    #[test]
    fn unreadable_raw_data_serves_snapshot_flagged_stale() {
        let store = Arc::new(MemoryStore::new());
        let stored = IndicatorSet::empty("AAA", day(38), "test");
        store.upsert_snapshot(&stored, UpsertGuard::NotOlder).unwrap();
        let r = FallbackResolver::new(
            WindowBuilder::new(Arc::new(OfflineProvider)),
            Arc::new(IndicatorEngine::default()),
            store,
        );

        let res = r.resolve("AAA").unwrap();
        assert_eq!(res.origin, ResolutionOrigin::Snapshot);
        assert!(res.stale);
        assert_eq!(res.set, stored);

        assert!(matches!(
            r.resolve("BBB"),
            Err(FallbackError::Data(DataError::Unavailable(_)))
        ));
    }

    #[test]
    fn vendor_switch_before_window_still_computes() {
        let mut switched = points(300, "vendor_b");
        for p in switched.iter_mut().take(100) {
            p.source = "vendor_a".into();
        }
        let res = resolver(switched, Arc::new(MemoryStore::new()))
            .resolve("AAA")
            .unwrap();
        assert_eq!(res.origin, ResolutionOrigin::Computed);
        assert_eq!(res.set.calculated_date, day(299));
        assert_eq!(res.set.source, "vendor_b");
        assert_eq!(res.set.window_len, 200);
    }

    #[test]
    fn nothing_anywhere_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let err = resolver(points(5, "test"), store).resolve("ZZZ").unwrap_err();
        assert!(matches!(err, FallbackError::NotFound { ref symbol } if symbol == "ZZZ"));
    }

    #[test]
    fn cache_fill_never_overwrites_same_or_newer() {
        let store = Arc::new(MemoryStore::new());
        let r = resolver(points(5, "test"), store.clone());
        let batch_row = IndicatorSet::empty("AAA", day(4), "test");
        store.upsert_snapshot(&batch_row, UpsertGuard::NotOlder).unwrap();

        let mut same_day = IndicatorSet::empty("AAA", day(4), "test");
        same_day.window_len = 99;
        assert!(!r.try_cache_fill(&same_day));
        assert!(!r.try_cache_fill(&IndicatorSet::empty("AAA", day(3), "test")));
        assert_eq!(store.get_snapshot("AAA").unwrap().unwrap(), batch_row);

        assert!(r.try_cache_fill(&IndicatorSet::empty("AAA", day(5), "test")));
        assert_eq!(store.get_snapshot("AAA").unwrap().unwrap().calculated_date, day(5));
    }
}
