//! Relative price change over k points.
//!
//! change[t] = (close[t] - close[t-k]) / close[t-k]
//! Stored as a ratio (0.05 = +5%). Needs k + 1 points.

use super::indicator::Indicator;
use crate::domain::PricePoint;

#[derive(Debug, Clone)]
pub struct Change {
    period: usize,
    name: String,
}

impl Change {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "change period must be >= 1");
        Self {
            period,
            name: format!("change_{period}d"),
        }
    }
}

impl Indicator for Change {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_points(&self) -> usize {
        self.period + 1
    }

    fn compute(&self, points: &[PricePoint]) -> Vec<f64> {
        let n = points.len();
        let mut result = vec![f64::NAN; n];

        for i in self.period..n {
            let prev = points[i - self.period].close;
            let curr = points[i].close;
            if prev.is_nan() || curr.is_nan() || prev == 0.0 {
                continue;
            }
            result[i] = (curr - prev) / prev;
        }

        result
    }
}
