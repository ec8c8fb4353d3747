//! Property tests for indicator and engine invariants.
//!
//! 1. Monotone closes pin RSI(14) at 100 / 0
//! 2. SMA over a constant series equals the constant
//! 3. Bounded outputs: RSI in [0, 100], Bollinger position in [0, 1]
//! 4. Determinism: the same window yields the same IndicatorSet

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use screenlab_core::domain::{FieldId, PricePoint};
use screenlab_core::engine::{IndicatorEngine, PriceSeries};
use screenlab_core::indicators::{Bollinger, Indicator, Rsi, Sma};

fn points_from(closes: &[f64]) -> Vec<PricePoint> {
    let base = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| PricePoint {
            symbol: "PROP".into(),
            date: base + chrono::Duration::days(i as i64),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10_000 + i as u64,
            source: "prop".into(),
        })
        .collect()
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_closes(min: usize, max: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1.0..1000.0_f64, min..max)
}

/// Strictly increasing: start plus positive increments.
fn arb_increasing(len: usize) -> impl Strategy<Value = Vec<f64>> {
    (1.0..500.0_f64, prop::collection::vec(0.01..10.0_f64, len - 1)).prop_map(|(start, steps)| {
        let mut out = vec![start];
        for s in steps {
            let next = out[out.len() - 1] + s;
            out.push(next);
        }
        out
    })
}

proptest! {
    #[test]
    fn rsi_increasing_is_100(closes in (15usize..80).prop_flat_map(arb_increasing)) {
        let rsi = Rsi::new(14).last(&points_from(&closes));
        prop_assert!((rsi - 100.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_decreasing_is_0(closes in (15usize..80).prop_flat_map(arb_increasing)) {
        let reversed: Vec<f64> = closes.iter().rev().copied().collect();
        let rsi = Rsi::new(14).last(&points_from(&reversed));
        prop_assert!(rsi.abs() < 1e-9);
    }

    #[test]
    fn sma_of_constant_is_constant(value in 0.01..10_000.0_f64, len in 1usize..250, period in 1usize..50) {
        let points = points_from(&vec![value; len]);
        let result = Sma::new(period).compute(&points);
        for v in result.iter().filter(|v| !v.is_nan()) {
            prop_assert!((v - value).abs() <= value * 1e-12);
        }
        prop_assert_eq!(result.iter().filter(|v| !v.is_nan()).count(), len.saturating_sub(period - 1));
    }

    #[test]
    fn bounded_oscillators(closes in arb_closes(20, 120)) {
        let points = points_from(&closes);
        for v in Rsi::new(14).compute(&points).into_iter().filter(|v| !v.is_nan()) {
            prop_assert!((0.0..=100.0).contains(&v));
        }
        for v in Bollinger::position(20, 2.0).compute(&points).into_iter().filter(|v| !v.is_nan()) {
            prop_assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn engine_is_deterministic(closes in arb_closes(1, 260)) {
        let series = PriceSeries {
            symbol: "PROP".into(),
            source: Some("prop".into()),
            points: points_from(&closes),
        };
        let window = series.window_at(NaiveDate::MAX).unwrap().unwrap();
        let engine = IndicatorEngine::default();
        let a = engine.compute(&window);
        let b = engine.compute(&window);
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());

        // Never a sentinel zero where history is missing
        if window.len() < 200 {
            prop_assert!(!a.get(FieldId::Sma200).is_computed());
        }
        if let Some(rsi) = a.rsi_14.decimal() {
            prop_assert!(rsi >= Decimal::ZERO && rsi <= Decimal::ONE_HUNDRED);
        }
    }
}
