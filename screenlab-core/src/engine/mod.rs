//! Indicator engine — window in, IndicatorSet out.
//!
//! The engine is pure and stateless: the same window always produces the same
//! set. Fields whose lookback exceeds the window are left not computed, as are
//! fields whose computation is undefined (guarded division, non-finite result).

pub mod lookback;
pub mod window;

pub use lookback::{calendar_span_days, min_points, LOOKBACK_TABLE, MAX_LOOKBACK};
pub use window::{PriceSeries, Sufficiency, Window, WindowBuilder};

use crate::domain::{FieldId, IndicatorSet, PriceField};
use crate::fingerprint::window_hash;
use crate::indicators::{
    Bollinger, BollingerBand, Change, Ema, Indicator, Macd, MacdOutput, Rsi, Sma, Volatility,
};
use serde::{Deserialize, Serialize};

/// Tunable constants of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineParams {
    /// Bollinger band width in standard deviations.
    pub bollinger_k: f64,
    /// Annualization factor for volatility.
    pub periods_per_year: f64,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            bollinger_k: 2.0,
            periods_per_year: 252.0,
        }
    }
}

/// Result of a computation plus the fields that had enough history but still
/// came out undefined.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutput {
    pub set: IndicatorSet,
    pub undefined_fields: Vec<FieldId>,
}

pub struct IndicatorEngine {
    params: EngineParams,
    registry: Vec<(FieldId, Box<dyn Indicator>)>,
}

impl IndicatorEngine {
    pub fn new(params: EngineParams) -> Self {
        Self {
            params,
            registry: build_registry(&params),
        }
    }

    /// Replace the indicator behind one field. Sufficiency still follows the
    /// lookback table for that field.
    pub fn with_indicator(mut self, field: FieldId, indicator: Box<dyn Indicator>) -> Self {
        if let Some(slot) = self.registry.iter_mut().find(|(f, _)| *f == field) {
            slot.1 = indicator;
        }
        self
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    pub fn compute(&self, window: &Window) -> IndicatorSet {
        self.compute_with_diagnostics(window).set
    }

    pub fn compute_with_diagnostics(&self, window: &Window) -> EngineOutput {
        let mut set = IndicatorSet::empty(&window.symbol, window.target_date, &window.source);
        set.window_len = window.len();
        set.window_hash = window_hash(&window.points);

        let mut undefined_fields = Vec::new();
        for (field, indicator) in &self.registry {
            if !window.sufficiency.is_sufficient(*field) {
                continue;
            }
            set.set_f64(*field, indicator.last(&window.points));
            if !set.get(*field).is_computed() {
                undefined_fields.push(*field);
            }
        }

        EngineOutput {
            set,
            undefined_fields,
        }
    }
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self::new(EngineParams::default())
    }
}

impl std::fmt::Debug for IndicatorEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndicatorEngine")
            .field("params", &self.params)
            .field("fields", &self.registry.len())
            .finish()
    }
}

fn build_registry(params: &EngineParams) -> Vec<(FieldId, Box<dyn Indicator>)> {
    let k = params.bollinger_k;
    FieldId::ALL
        .iter()
        .map(|&field| {
            let indicator: Box<dyn Indicator> = match field {
                FieldId::Sma5 => Box::new(Sma::new(5)),
                FieldId::Sma20 => Box::new(Sma::new(20)),
                FieldId::Sma60 => Box::new(Sma::new(60)),
                FieldId::Sma120 => Box::new(Sma::new(120)),
                FieldId::Sma200 => Box::new(Sma::new(200)),
                FieldId::Ema12 => Box::new(Ema::new(12)),
                FieldId::Ema26 => Box::new(Ema::new(26)),
                FieldId::Rsi14 => Box::new(Rsi::new(14)),
                FieldId::MacdLine => Box::new(Macd::standard(MacdOutput::Line)),
                FieldId::MacdSignal => Box::new(Macd::standard(MacdOutput::Signal)),
                FieldId::MacdHistogram => Box::new(Macd::standard(MacdOutput::Histogram)),
                FieldId::BbUpper => Box::new(Bollinger::new(BollingerBand::Upper, 20, k)),
                FieldId::BbMiddle => Box::new(Bollinger::new(BollingerBand::Middle, 20, k)),
                FieldId::BbLower => Box::new(Bollinger::new(BollingerBand::Lower, 20, k)),
                FieldId::BbPosition => Box::new(Bollinger::new(BollingerBand::Position, 20, k)),
                FieldId::BbWidth => Box::new(Bollinger::new(BollingerBand::Width, 20, k)),
                FieldId::Volatility20 => Box::new(Volatility::new(20, params.periods_per_year)),
                FieldId::Change1d => Box::new(Change::new(1)),
                FieldId::Change5d => Box::new(Change::new(5)),
                FieldId::Change20d => Box::new(Change::new(20)),
                FieldId::Change60d => Box::new(Change::new(60)),
                FieldId::Change120d => Box::new(Change::new(120)),
                FieldId::VolumeSma5 => Box::new(Sma::on(PriceField::Volume, 5)),
                FieldId::VolumeSma20 => Box::new(Sma::on(PriceField::Volume, 20)),
            };
            (field, indicator)
        })
        .collect()
}
