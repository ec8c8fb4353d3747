//! In-memory raw price provider, used by tests and embedding callers.

use super::provider::{DataError, PriceSeriesProvider, SymbolUniverse};
use crate::domain::PricePoint;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Points keyed by symbol, kept sorted by date.
#[derive(Debug, Default)]
pub struct MemoryPriceProvider {
    series: RwLock<BTreeMap<String, Vec<PricePoint>>>,
}

impl MemoryPriceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(points: Vec<PricePoint>) -> Self {
        let provider = Self::new();
        provider.insert(points);
        provider
    }

    /// Add points (any symbols). Later inserts for an existing
    /// (symbol, date, source) replace the earlier point.
    pub fn insert(&self, points: Vec<PricePoint>) {
        let mut guard = match self.series.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        for point in points {
            let entry = guard.entry(point.symbol.clone()).or_default();
            entry.retain(|p| !(p.date == point.date && p.source == point.source));
            entry.push(point);
            entry.sort_by_key(|p| p.date);
        }
    }
}

impl PriceSeriesProvider for MemoryPriceProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn get_price_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        source: Option<&str>,
    ) -> Result<Vec<PricePoint>, DataError> {
        let guard = self
            .series
            .read()
            .map_err(|_| DataError::Unavailable("price map lock poisoned".into()))?;
        Ok(guard
            .get(symbol)
            .map(|points| {
                points
                    .iter()
                    .filter(|p| p.date >= start && p.date <= end)
                    .filter(|p| source.map_or(true, |s| p.source == s))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl SymbolUniverse for MemoryPriceProvider {
    fn list_active_symbols(&self) -> Result<Vec<String>, DataError> {
        let guard = self
            .series
            .read()
            .map_err(|_| DataError::Unavailable("price map lock poisoned".into()))?;
        Ok(guard.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_points;

    #[test]
    fn range_and_source_filtering() {
        let provider = MemoryPriceProvider::with_series(make_points(&[1.0, 2.0, 3.0, 4.0]));
        let start = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 4).unwrap();

        let points = provider.get_price_series("TEST", start, end, None).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].close, 2.0);

        let none = provider.get_price_series("TEST", start, end, Some("other")).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn reinsert_replaces_point() {
        let provider = MemoryPriceProvider::with_series(make_points(&[1.0, 2.0]));
        let mut updated = make_points(&[9.0]);
        updated[0].close = 9.0;
        provider.insert(updated);

        let all = provider
            .get_price_series("TEST", NaiveDate::MIN, NaiveDate::MAX, None)
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].close, 9.0);
    }

    #[test]
    fn latest_date_and_universe() {
        let provider = MemoryPriceProvider::with_series(make_points(&[1.0, 2.0, 3.0]));
        assert_eq!(
            provider.latest_date("TEST", None).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 4)
        );
        assert_eq!(provider.latest_date("NOPE", None).unwrap(), None);
        assert_eq!(provider.list_active_symbols().unwrap(), vec!["TEST".to_string()]);
    }
}
