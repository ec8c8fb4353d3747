//! WindowBuilder — resolves the raw window each calculation target needs.
//!
//! One provider call per symbol covers a date range plus the calendar span of
//! the longest lookback; windows for individual targets are sliced out of that
//! series. The fetched series may cross a vendor switch; only a window whose
//! own points span more than one source is rejected. Short history is not an
//! error: the window carries a `Sufficiency` that tells the engine which fields
//! to leave uncomputed.

use super::lookback::{calendar_span_days, min_points, MAX_LOOKBACK};
use crate::data::{DataError, PriceSeriesProvider};
use crate::domain::{FieldId, PricePoint};
use chrono::{Duration, NaiveDate};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Per-field "enough history" flags for one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sufficiency {
    available: usize,
}

impl Sufficiency {
    pub fn new(available: usize) -> Self {
        Self { available }
    }

    pub fn available(&self) -> usize {
        self.available
    }

    pub fn is_sufficient(&self, field: FieldId) -> bool {
        self.available >= min_points(field)
    }

    pub fn insufficient_fields(&self) -> Vec<FieldId> {
        FieldId::ALL
            .iter()
            .copied()
            .filter(|f| !self.is_sufficient(*f))
            .collect()
    }
}

/// A contiguous, ordered, single-source run of points ending at `target_date`.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub symbol: String,
    /// Date of the final point (the last raw date on or before the request).
    pub target_date: NaiveDate,
    pub source: String,
    pub points: Vec<PricePoint>,
    pub sufficiency: Sufficiency,
}

impl Window {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Raw points for one symbol, sorted by date.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    pub symbol: String,
    /// Declared source every window must match. `None` accepts any single source.
    pub source: Option<String>,
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    /// Last raw date on or before `target`.
    pub fn last_date_on_or_before(&self, target: NaiveDate) -> Option<NaiveDate> {
        let idx = self.points.partition_point(|p| p.date <= target);
        idx.checked_sub(1).map(|i| self.points[i].date)
    }

    /// Every raw date inside `[start, end]`, ascending.
    pub fn dates_in(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        self.points
            .iter()
            .map(|p| p.date)
            .filter(|d| *d >= start && *d <= end)
            .collect()
    }

    /// Number of points strictly before `date`.
    pub fn points_before(&self, date: NaiveDate) -> usize {
        self.points.partition_point(|p| p.date < date)
    }

    /// Index range of the window for `target`. `None` if no point qualifies.
    fn window_bounds(&self, target: NaiveDate) -> Option<(usize, usize)> {
        let end = self.points.partition_point(|p| p.date <= target);
        (end > 0).then(|| (end.saturating_sub(MAX_LOOKBACK), end))
    }

    fn check_sources(&self, points: &[PricePoint]) -> Result<(), DataError> {
        let sources: BTreeSet<&str> = points.iter().map(|p| p.source.as_str()).collect();
        let declared_violated = match (&self.source, sources.iter().next()) {
            (Some(declared), Some(found)) => sources.len() == 1 && declared != found,
            _ => false,
        };
        if sources.len() > 1 || declared_violated {
            return Err(DataError::SourceMismatch {
                symbol: self.symbol.clone(),
                sources: sources.into_iter().map(String::from).collect(),
            });
        }
        Ok(())
    }

    /// Source check for the window at `target` without materializing it.
    pub fn check_window(&self, target: NaiveDate) -> Result<(), DataError> {
        match self.window_bounds(target) {
            Some((start, end)) => self.check_sources(&self.points[start..end]),
            None => Ok(()),
        }
    }

    /// The window for `target`: up to `MAX_LOOKBACK` points ending at the last
    /// raw date on or before it. `Ok(None)` if no point qualifies; an error if
    /// those points mix sources or miss the declared one.
    pub fn window_at(&self, target: NaiveDate) -> Result<Option<Window>, DataError> {
        let Some((start, end)) = self.window_bounds(target) else {
            return Ok(None);
        };
        let slice = &self.points[start..end];
        self.check_sources(slice)?;
        let last = &slice[slice.len() - 1];
        Ok(Some(Window {
            symbol: self.symbol.clone(),
            target_date: last.date,
            source: last.source.clone(),
            sufficiency: Sufficiency::new(slice.len()),
            points: slice.to_vec(),
        }))
    }
}

/// Builds windows from a raw provider, enforcing a single declared source.
#[derive(Clone)]
pub struct WindowBuilder {
    provider: Arc<dyn PriceSeriesProvider>,
    source: Option<String>,
}

impl WindowBuilder {
    pub fn new(provider: Arc<dyn PriceSeriesProvider>) -> Self {
        Self {
            provider,
            source: None,
        }
    }

    /// Restrict windows to one declared source. `None` accepts any single source.
    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source = source;
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Fetch `[start - span, end]` in one provider call. Sources are checked
    /// per window, not across the whole fetch.
    pub fn fetch_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, DataError> {
        let from = start
            .checked_sub_signed(Duration::days(calendar_span_days(MAX_LOOKBACK)))
            .unwrap_or(NaiveDate::MIN);
        let mut points = self
            .provider
            .get_price_series(symbol, from, end, self.source.as_deref())?;
        points.sort_by_key(|p| p.date);

        Ok(PriceSeries {
            symbol: symbol.to_string(),
            source: self.source.clone(),
            points,
        })
    }

    /// Window for a single target. `Ok(None)` when no raw point exists on or
    /// before the target.
    pub fn build(&self, symbol: &str, target: NaiveDate) -> Result<Option<Window>, DataError> {
        self.fetch_series(symbol, target, target)?.window_at(target)
    }

    /// Newest raw date the provider holds for `symbol` under the declared source.
    pub fn latest_raw_date(&self, symbol: &str) -> Result<Option<NaiveDate>, DataError> {
        self.provider.latest_date(symbol, self.source.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MemoryPriceProvider;
    use crate::indicators::make_points;

    fn builder_with(points: Vec<PricePoint>) -> WindowBuilder {
        let provider = MemoryPriceProvider::new();
        provider.insert(points);
        WindowBuilder::new(Arc::new(provider))
    }

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap() + Duration::days(offset)
    }

    #[test]
    fn short_history_returns_prefix_with_flags() {
        let builder = builder_with(make_points(&[100.0; 50]));
        let window = builder.build("TEST", day(49)).unwrap().unwrap();

        assert_eq!(window.len(), 50);
        assert!(window.sufficiency.is_sufficient(FieldId::Sma20));
        assert!(window.sufficiency.is_sufficient(FieldId::MacdSignal));
        assert!(!window.sufficiency.is_sufficient(FieldId::Sma60));
        assert!(!window.sufficiency.is_sufficient(FieldId::Sma200));
        assert!(window.sufficiency.insufficient_fields().contains(&FieldId::Change60d));
    }

    #[test]
    fn window_capped_at_longest_lookback() {
        let series = PriceSeries {
            symbol: "TEST".into(),
            source: Some("test".into()),
            points: make_points(&[1.0; 260]),
        };
        let window = series.window_at(day(259)).unwrap().unwrap();
        assert_eq!(window.len(), MAX_LOOKBACK);
        assert_eq!(window.points[0].date, day(60));
    }

    #[test]
    fn window_ends_on_or_before_target() {
        let mut points = make_points(&[1.0, 2.0, 3.0]);
        points.remove(1); // gap on day 1
        let series = PriceSeries {
            symbol: "TEST".into(),
            source: Some("test".into()),
            points,
        };
        let window = series.window_at(day(1)).unwrap().unwrap();
        assert_eq!(window.target_date, day(0));
        assert_eq!(window.len(), 1);
        assert!(series.window_at(day(-1)).unwrap().is_none());
    }

    #[test]
    fn mixed_sources_rejected() {
        let mut points = make_points(&[1.0, 2.0, 3.0]);
        points[1].source = "vendor_b".into();
        let err = builder_with(points).build("TEST", day(2)).unwrap_err();
        assert!(matches!(err, DataError::SourceMismatch { ref sources, .. } if sources.len() == 2));
    }

    #[test]
    fn vendor_switch_outside_window_is_accepted() {
        let mut points = make_points(&[1.0; 300]);
        for p in points.iter_mut().take(100) {
            p.source = "vendor_a".into();
        }
        for p in points.iter_mut().skip(100) {
            p.source = "vendor_b".into();
        }
        let series = builder_with(points).fetch_series("TEST", day(299), day(299)).unwrap();
        assert_eq!(series.points.len(), 300);

        let window = series.window_at(day(299)).unwrap().unwrap();
        assert_eq!(window.len(), MAX_LOOKBACK);
        assert_eq!(window.source, "vendor_b");
        assert!(series.check_window(day(299)).is_ok());

        // A window ending one day earlier still reaches a vendor_a point.
        assert!(matches!(
            series.window_at(day(298)),
            Err(DataError::SourceMismatch { ref sources, .. }) if sources.len() == 2
        ));
        assert!(series.check_window(day(298)).is_err());
    }

    #[test]
    fn declared_source_mismatch_in_window_rejected() {
        let series = PriceSeries {
            symbol: "TEST".into(),
            source: Some("vendor_b".into()),
            points: make_points(&[1.0; 5]),
        };
        assert!(matches!(
            series.window_at(day(4)),
            Err(DataError::SourceMismatch { .. })
        ));
    }

    #[test]
    fn declared_source_filters_provider() {
        let mut points = make_points(&[1.0, 2.0, 3.0]);
        let mut other = points.clone();
        for p in &mut other {
            p.source = "vendor_b".into();
        }
        points.extend(other);
        let builder = builder_with(points).with_source(Some("vendor_b".into()));
        let window = builder.build("TEST", day(2)).unwrap().unwrap();
        assert_eq!(window.source, "vendor_b");
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn unknown_symbol_has_no_window() {
        let builder = builder_with(make_points(&[1.0]));
        assert!(builder.build("NOPE", day(0)).unwrap().is_none());
    }

    #[test]
    fn series_date_helpers() {
        let series = PriceSeries {
            symbol: "TEST".into(),
            source: Some("test".into()),
            points: make_points(&[1.0; 10]),
        };
        assert_eq!(series.dates_in(day(2), day(4)).len(), 3);
        assert_eq!(series.latest_date(), Some(day(9)));
        assert_eq!(series.last_date_on_or_before(day(20)), Some(day(9)));
        assert_eq!(series.points_before(day(3)), 3);
    }
}
