//! Indicator trait.
//!
//! Indicators are pure functions: a window of price points in, a numeric
//! series of the same length out. The engine reads the final element.

use crate::domain::PricePoint;

/// Trait for indicators.
///
/// The output series has the same length as the input window. Positions where
/// the indicator is not yet defined (warmup) or where a guarded division hit
/// zero hold `f64::NAN`; the engine turns those into "not computed".
///
/// # Look-ahead guard
/// No value at index t may depend on a point after t. Every indicator must
/// pass the truncated-vs-full window test.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "sma_20", "rsi_14").
    fn name(&self) -> &str;

    /// Number of points needed before the indicator produces a value at the
    /// last index.
    fn min_points(&self) -> usize;

    /// Compute the indicator for the entire window.
    fn compute(&self, points: &[PricePoint]) -> Vec<f64>;

    /// Value at the final point of the window, NaN if undefined.
    fn last(&self, points: &[PricePoint]) -> f64 {
        self.compute(points).last().copied().unwrap_or(f64::NAN)
    }
}
