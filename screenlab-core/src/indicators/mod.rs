//! Concrete indicator implementations.
//!
//! Every indicator implements the `Indicator` trait and is evaluated over a
//! single-symbol window. Multi-output indicators (MACD, Bollinger) are exposed
//! as separate named instances per output, keeping the single-series trait
//! unchanged.

pub mod bollinger;
pub mod change;
pub mod ema;
pub mod indicator;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod volatility;

pub use bollinger::{Bollinger, BollingerBand};
pub use change::Change;
pub use ema::{ema_after_warmup, ema_of_series, Ema};
pub use indicator::Indicator;
pub use macd::{Macd, MacdOutput};
pub use rsi::Rsi;
pub use sma::{sma_of_series, Sma};
pub use volatility::Volatility;

/// Create synthetic points from close prices for testing.
///
/// Generates plausible OHLV: open = prev_close (or close for first point),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, volume = 1000.
#[cfg(test)]
pub fn make_points(closes: &[f64]) -> Vec<crate::domain::PricePoint> {
    use crate::domain::PricePoint;
    let base_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            PricePoint {
                symbol: "TEST".to_string(),
                date: base_date + chrono::Duration::days(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000,
                source: "test".to_string(),
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
