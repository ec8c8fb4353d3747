//! Moving Average Convergence/Divergence (MACD).
//!
//! line      = EMA(close, fast) - EMA(close, slow)
//! signal    = EMA(line, signal), seeded from the first defined line value
//! histogram = line - signal

use super::ema::{ema_after_warmup, ema_of_series};
use super::indicator::Indicator;
use crate::domain::PricePoint;

/// Which output of the MACD triple to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdOutput {
    Line,
    Signal,
    Histogram,
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast: usize,
    slow: usize,
    signal: usize,
    output: MacdOutput,
    name: String,
}

impl Macd {
    pub fn new(output: MacdOutput, fast: usize, slow: usize, signal: usize) -> Self {
        assert!(fast >= 1 && signal >= 1, "MACD periods must be >= 1");
        assert!(slow > fast, "MACD slow period must exceed fast period");
        let suffix = match output {
            MacdOutput::Line => "line",
            MacdOutput::Signal => "signal",
            MacdOutput::Histogram => "histogram",
        };
        Self {
            fast,
            slow,
            signal,
            output,
            name: format!("macd_{suffix}_{fast}_{slow}_{signal}"),
        }
    }

    /// The standard 12/26/9 configuration.
    pub fn standard(output: MacdOutput) -> Self {
        Self::new(output, 12, 26, 9)
    }

    fn line(&self, closes: &[f64]) -> Vec<f64> {
        let fast = ema_of_series(closes, self.fast);
        let slow = ema_of_series(closes, self.slow);
        fast.iter().zip(&slow).map(|(f, s)| f - s).collect()
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_points(&self) -> usize {
        match self.output {
            MacdOutput::Line => self.slow,
            MacdOutput::Signal | MacdOutput::Histogram => self.slow + self.signal,
        }
    }

    fn compute(&self, points: &[PricePoint]) -> Vec<f64> {
        let closes: Vec<f64> = points.iter().map(|p| p.close).collect();
        let line = self.line(&closes);
        if self.output == MacdOutput::Line {
            return line;
        }

        let signal = ema_after_warmup(&line, self.signal);
        match self.output {
            MacdOutput::Signal => signal,
            _ => line.iter().zip(&signal).map(|(l, s)| l - s).collect(),
        }
    }
}
