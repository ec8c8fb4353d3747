//! Consumer-facing read API.

use crate::config::ScreenConfig;
use crate::fallback::{FallbackError, FallbackResolver, ResolutionOrigin};
use chrono::NaiveDate;
use screenlab_core::data::PriceSeriesProvider;
use screenlab_core::domain::IndicatorSet;
use screenlab_core::engine::{IndicatorEngine, WindowBuilder};
use screenlab_core::store::{HistoryStore, SnapshotStore, StorageError};
use std::sync::Arc;

pub struct IndicatorService {
    snapshots: Arc<dyn SnapshotStore>,
    history: Arc<dyn HistoryStore>,
    fallback: Option<FallbackResolver>,
}

impl IndicatorService {
    /// Stored values only; a missing snapshot is `NotFound`.
    pub fn new(snapshots: Arc<dyn SnapshotStore>, history: Arc<dyn HistoryStore>) -> Self {
        Self {
            snapshots,
            history,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: FallbackResolver) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Service with a fallback resolver wired from config.
    pub fn from_config(
        config: &ScreenConfig,
        provider: Arc<dyn PriceSeriesProvider>,
        snapshots: Arc<dyn SnapshotStore>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        let builder = WindowBuilder::new(provider).with_source(config.data.default_source.clone());
        let engine = Arc::new(IndicatorEngine::new(config.engine_params()));
        let fallback = FallbackResolver::new(builder, engine, Arc::clone(&snapshots))
            .with_staleness(config.staleness_margin())
            .with_timeout(config.fallback_timeout())
            .with_cache_fill(config.fallback.cache_fill);
        Self::new(snapshots, history).with_fallback(fallback)
    }

    pub fn get_latest(&self, symbol: &str) -> Result<IndicatorSet, FallbackError> {
        let Some(fallback) = &self.fallback else {
            return self
                .snapshots
                .get_snapshot(symbol)?
                .ok_or_else(|| FallbackError::NotFound {
                    symbol: symbol.to_string(),
                });
        };

        let resolution = fallback.resolve(symbol)?;
        if resolution.origin == ResolutionOrigin::Computed && fallback.cache_fill_enabled() {
            fallback.try_cache_fill(&resolution.set);
        }
        Ok(resolution.set)
    }

    /// History records in `[start, end]`, ascending.
    pub fn get_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<IndicatorSet>, StorageError> {
        if start > end {
            return Ok(Vec::new());
        }
        self.history.history_range(symbol, start, end)
    }
}
