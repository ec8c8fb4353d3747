//! Annualized volatility.
//!
//! Sample stddev of the last `period` simple returns, scaled by
//! sqrt(periods_per_year). Needs period + 1 points.

use super::indicator::Indicator;
use crate::domain::PricePoint;

#[derive(Debug, Clone)]
pub struct Volatility {
    period: usize,
    periods_per_year: f64,
    name: String,
}

impl Volatility {
    pub fn new(period: usize, periods_per_year: f64) -> Self {
        assert!(period >= 2, "volatility period must be >= 2");
        Self {
            period,
            periods_per_year,
            name: format!("volatility_{period}"),
        }
    }
}

/// Simple returns aligned to the input; index 0 is NaN.
fn simple_returns(points: &[PricePoint]) -> Vec<f64> {
    std::iter::once(f64::NAN)
        .chain(points.windows(2).map(|w| {
            let prev = w[0].close;
            if prev == 0.0 {
                f64::NAN
            } else {
                w[1].close / prev - 1.0
            }
        }))
        .collect()
}

impl Indicator for Volatility {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_points(&self) -> usize {
        self.period + 1
    }

    fn compute(&self, points: &[PricePoint]) -> Vec<f64> {
        let n = points.len();
        let mut result = vec![f64::NAN; n];
        if n < self.period + 1 {
            return result;
        }

        let returns = simple_returns(points);
        let scale = self.periods_per_year.sqrt();

        for i in self.period..n {
            let window = &returns[i + 1 - self.period..=i];
            if window.iter().any(|r| r.is_nan()) {
                continue;
            }
            let mean = window.iter().sum::<f64>() / self.period as f64;
            let ss: f64 = window.iter().map(|r| (r - mean).powi(2)).sum();
            result[i] = (ss / (self.period - 1) as f64).sqrt() * scale;
        }

        result
    }
}
