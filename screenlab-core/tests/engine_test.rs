//! Engine integration: provider → WindowBuilder → IndicatorEngine.

use chrono::{Duration, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use screenlab_core::data::{DataError, MemoryPriceProvider, ParquetPriceStore};
use screenlab_core::domain::{FieldId, PricePoint};
use screenlab_core::engine::{IndicatorEngine, WindowBuilder};
use std::sync::Arc;

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()
}

fn series(symbol: &str, source: &str, closes: &[f64]) -> Vec<PricePoint> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| PricePoint {
            symbol: symbol.into(),
            date: base() + Duration::days(i as i64),
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 1_000 + (i as u64 % 7) * 100,
            source: source.into(),
        })
        .collect()
}

fn wave(n: usize) -> Vec<f64> {
    (0..n).map(|i| 100.0 + (i as f64 * 0.21).sin() * 8.0 + i as f64 * 0.05).collect()
}

#[test]
fn fifty_points_populates_short_fields_only() {
    let provider = Arc::new(MemoryPriceProvider::with_series(series("NEW", "vendor_a", &wave(50))));
    let builder = WindowBuilder::new(provider);
    let window = builder.build("NEW", base() + Duration::days(49)).unwrap().unwrap();
    let set = IndicatorEngine::default().compute(&window);

    for field in [FieldId::Sma200, FieldId::Sma120, FieldId::Sma60, FieldId::Change60d, FieldId::Change120d] {
        assert!(!set.get(field).is_computed(), "{field} should be null");
    }
    for field in [
        FieldId::Sma20,
        FieldId::Sma5,
        FieldId::BbUpper,
        FieldId::BbPosition,
        FieldId::Volatility20,
        FieldId::Rsi14,
        FieldId::MacdHistogram,
        FieldId::VolumeSma20,
        FieldId::Change20d,
    ] {
        assert!(set.get(field).is_computed(), "{field} should be populated");
    }
}

#[test]
fn full_window_matches_direct_means() {
    let closes = wave(230);
    let provider = Arc::new(MemoryPriceProvider::with_series(series("OLD", "vendor_a", &closes)));
    let builder = WindowBuilder::new(provider);
    let window = builder.build("OLD", base() + Duration::days(229)).unwrap().unwrap();
    assert_eq!(window.len(), 200);

    let set = IndicatorEngine::default().compute(&window);
    assert!(set.is_complete());

    let mean200: f64 = closes[30..].iter().sum::<f64>() / 200.0;
    let sma200 = set.moving_averages.sma_200.decimal().unwrap().to_f64().unwrap();
    assert!((sma200 - mean200).abs() <= 0.00005 + 1e-9);

    let change_1d = (closes[229] - closes[228]) / closes[228];
    let stored = set.changes.change_1d.decimal().unwrap().to_f64().unwrap();
    assert!((stored - change_1d).abs() <= 0.0000005 + 1e-12);
}

#[test]
fn mixed_source_window_is_rejected() {
    let mut points = series("MIX", "vendor_a", &wave(40));
    for p in points.iter_mut().skip(20) {
        p.source = "vendor_b".into();
    }
    let builder = WindowBuilder::new(Arc::new(MemoryPriceProvider::with_series(points)));
    let err = builder.build("MIX", base() + Duration::days(39)).unwrap_err();
    assert!(matches!(err, DataError::SourceMismatch { .. }));
}

#[test]
fn parquet_store_feeds_window_builder() {
    let dir = tempfile::tempdir().unwrap();
    let store = ParquetPriceStore::new(dir.path());
    store.write("PQ", &series("PQ", "vendor_a", &wave(40))).unwrap();

    let builder = WindowBuilder::new(Arc::new(store)).with_source(Some("vendor_a".into()));
    let window = builder.build("PQ", base() + Duration::days(39)).unwrap().unwrap();
    assert_eq!(window.len(), 40);
    assert_eq!(window.source, "vendor_a");

    let set = IndicatorEngine::default().compute(&window);
    assert!(set.macd.signal.is_computed());
    assert!(!set.moving_averages.sma_60.is_computed());
}
