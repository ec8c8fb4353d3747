//! Simple Moving Average (SMA).
//!
//! Rolling mean of a price field over a lookback window.
//! First valid value at index period-1.

use super::indicator::Indicator;
use crate::domain::{PriceField, PricePoint};

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    field: PriceField,
    name: String,
}

impl Sma {
    /// SMA over closes.
    pub fn new(period: usize) -> Self {
        Self::on(PriceField::Close, period)
    }

    /// SMA over an arbitrary price field (closes or volumes).
    pub fn on(field: PriceField, period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self {
            period,
            field,
            name: format!("{}sma_{period}", field.prefix()),
        }
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_points(&self) -> usize {
        self.period
    }

    fn compute(&self, points: &[PricePoint]) -> Vec<f64> {
        let values: Vec<f64> = points.iter().map(|p| p.field(self.field)).collect();
        sma_of_series(&values, self.period)
    }
}

/// Rolling mean of a raw f64 series. NaN in a window yields NaN for that index.
pub fn sma_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if period == 0 || n < period {
        return result;
    }

    // Compute initial window sum
    let mut sum = 0.0;
    let mut nan_in_window = false;
    for &v in values.iter().take(period) {
        if v.is_nan() {
            nan_in_window = true;
        }
        sum += v;
    }

    if !nan_in_window {
        result[period - 1] = sum / period as f64;
    }

    // Roll the window forward
    for i in period..n {
        let leaving = values[i - period];
        let entering = values[i];
        sum = sum - leaving + entering;

        // Rescan when a NaN enters or leaves; the running sum is poisoned.
        if entering.is_nan() || leaving.is_nan() || nan_in_window {
            nan_in_window = false;
            sum = 0.0;
            for &v in &values[(i + 1 - period)..=i] {
                if v.is_nan() {
                    nan_in_window = true;
                }
                sum += v;
            }
            if nan_in_window {
                continue;
            }
        }

        result[i] = sum / period as f64;
    }

    result
}
