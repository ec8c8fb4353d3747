//! Bollinger Bands: moving average +/- standard deviation multiplier.
//!
//! Five outputs (separate Indicator instances):
//! - Middle: SMA(close, period)
//! - Upper: middle + mult * stddev(close, period)
//! - Lower: middle - mult * stddev(close, period)
//! - Position: (close - lower) / (upper - lower), clamped to [0, 1]; 0 when bands collapse
//! - Width: (upper - lower) / middle; NaN when middle is 0
//!
//! Uses sample stddev (divide by N - 1).

use super::indicator::Indicator;
use crate::domain::PricePoint;

/// Which output of the Bollinger Bands to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BollingerBand {
    Upper,
    Middle,
    Lower,
    Position,
    Width,
}

impl BollingerBand {
    fn label(self) -> &'static str {
        match self {
            BollingerBand::Upper => "upper",
            BollingerBand::Middle => "middle",
            BollingerBand::Lower => "lower",
            BollingerBand::Position => "position",
            BollingerBand::Width => "width",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Bollinger {
    period: usize,
    multiplier: f64,
    band: BollingerBand,
    name: String,
}

impl Bollinger {
    pub fn new(band: BollingerBand, period: usize, multiplier: f64) -> Self {
        assert!(period >= 1, "Bollinger period must be >= 1");
        Self {
            period,
            multiplier,
            band,
            name: format!("bb_{}_{period}_{multiplier}", band.label()),
        }
    }

    pub fn upper(period: usize, multiplier: f64) -> Self {
        Self::new(BollingerBand::Upper, period, multiplier)
    }

    pub fn middle(period: usize, multiplier: f64) -> Self {
        Self::new(BollingerBand::Middle, period, multiplier)
    }

    pub fn lower(period: usize, multiplier: f64) -> Self {
        Self::new(BollingerBand::Lower, period, multiplier)
    }

    pub fn position(period: usize, multiplier: f64) -> Self {
        Self::new(BollingerBand::Position, period, multiplier)
    }

    pub fn width(period: usize, multiplier: f64) -> Self {
        Self::new(BollingerBand::Width, period, multiplier)
    }
}

/// All three bands at one index. `None` if the window holds a NaN.
fn bands_at(points: &[PricePoint], i: usize, period: usize, mult: f64) -> Option<(f64, f64, f64)> {
    let window = &points[i + 1 - period..=i];
    if window.iter().any(|p| p.close.is_nan()) {
        return None;
    }

    let mean = window.iter().map(|p| p.close).sum::<f64>() / period as f64;
    let stddev = if period > 1 {
        let ss: f64 = window.iter().map(|p| (p.close - mean).powi(2)).sum();
        (ss / (period - 1) as f64).sqrt()
    } else {
        0.0
    };

    Some((mean + mult * stddev, mean, mean - mult * stddev))
}

impl Indicator for Bollinger {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_points(&self) -> usize {
        self.period
    }

    fn compute(&self, points: &[PricePoint]) -> Vec<f64> {
        let n = points.len();
        let mut result = vec![f64::NAN; n];

        if n < self.period {
            return result;
        }

        for i in (self.period - 1)..n {
            let Some((upper, middle, lower)) = bands_at(points, i, self.period, self.multiplier)
            else {
                continue;
            };

            result[i] = match self.band {
                BollingerBand::Upper => upper,
                BollingerBand::Middle => middle,
                BollingerBand::Lower => lower,
                BollingerBand::Position => {
                    let range = upper - lower;
                    if range == 0.0 {
                        0.0
                    } else {
                        ((points[i].close - lower) / range).clamp(0.0, 1.0)
                    }
                }
                BollingerBand::Width => {
                    if middle == 0.0 {
                        f64::NAN
                    } else {
                        (upper - lower) / middle
                    }
                }
            };
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_points, DEFAULT_EPSILON};

    #[test]
    fn bollinger_middle_is_sma() {
        let points = make_points(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        let result = Bollinger::middle(3, 2.0).compute(&points);

        assert!(result[0].is_nan());
        assert!(result[1].is_nan());
        assert_approx(result[2], 11.0, DEFAULT_EPSILON);
        assert_approx(result[3], 12.0, DEFAULT_EPSILON);
    }

    #[test]
    fn bollinger_uses_sample_stddev() {
        // mean(10,11,12) = 11; sample variance = (1 + 0 + 1) / 2 = 1 → stddev 1
        let points = make_points(&[10.0, 11.0, 12.0]);
        let upper = Bollinger::upper(3, 2.0).last(&points);
        let lower = Bollinger::lower(3, 2.0).last(&points);
        assert_approx(upper, 13.0, DEFAULT_EPSILON);
        assert_approx(lower, 9.0, DEFAULT_EPSILON);
    }

    #[test]
    fn bollinger_bands_symmetric() {
        let points = make_points(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        let upper = Bollinger::upper(3, 2.0).compute(&points);
        let middle = Bollinger::middle(3, 2.0).compute(&points);
        let lower = Bollinger::lower(3, 2.0).compute(&points);

        for i in 2..5 {
            let half_width = upper[i] - middle[i];
            assert_approx(middle[i] - lower[i], half_width, DEFAULT_EPSILON);
        }
    }

    #[test]
    fn bollinger_constant_price_collapses() {
        let points = make_points(&[100.0, 100.0, 100.0, 100.0]);
        assert_approx(Bollinger::upper(3, 2.0).last(&points), 100.0, DEFAULT_EPSILON);
        assert_approx(Bollinger::lower(3, 2.0).last(&points), 100.0, DEFAULT_EPSILON);
        // upper == lower → position 0, width 0
        assert_approx(Bollinger::position(3, 2.0).last(&points), 0.0, DEFAULT_EPSILON);
        assert_approx(Bollinger::width(3, 2.0).last(&points), 0.0, DEFAULT_EPSILON);
    }

    #[test]
    fn bollinger_position_in_unit_interval() {
        // Last close is a big jump above the window: raw position > 1, clamped.
        let points = make_points(&[10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 50.0]);
        let pos = Bollinger::position(10, 0.5).last(&points);
        assert_approx(pos, 1.0, DEFAULT_EPSILON);

        // mean = 11, bands 9..13, close 12 → 0.75
        let points = make_points(&[10.0, 11.0, 12.0]);
        assert_approx(Bollinger::position(3, 2.0).last(&points), 0.75, DEFAULT_EPSILON);
    }

    #[test]
    fn bollinger_width_ratio() {
        let points = make_points(&[10.0, 11.0, 12.0]);
        // (13 - 9) / 11
        assert_approx(Bollinger::width(3, 2.0).last(&points), 4.0 / 11.0, DEFAULT_EPSILON);
    }

    #[test]
    fn bollinger_width_undefined_on_zero_middle() {
        let points = make_points(&[1.0, -1.0, 0.0]);
        assert!(Bollinger::width(3, 2.0).last(&points).is_nan());
    }

    #[test]
    fn bollinger_nan_propagation() {
        let mut points = make_points(&[10.0, 11.0, 12.0, 13.0]);
        points[2].close = f64::NAN;
        let result = Bollinger::upper(3, 2.0).compute(&points);
        assert!(result[2].is_nan());
        assert!(result[3].is_nan());
    }

    #[test]
    fn bollinger_min_points() {
        assert_eq!(Bollinger::upper(20, 2.0).min_points(), 20);
    }
}
