//! IndicatorSet — the computed indicator vector for one (symbol, date).
//!
//! Every field is an [`IndicatorValue`]: either a decimal rounded to the
//! field's fixed scale, or an explicit `NotComputed` marker. Zero is a real
//! value and is never used to mean "missing".

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single indicator field value.
///
/// Serializes as `null` when not computed, otherwise as the decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<Decimal>", into = "Option<Decimal>")]
pub enum IndicatorValue {
    Value(Decimal),
    #[default]
    NotComputed,
}

impl IndicatorValue {
    /// Convert an engine output to a bounded decimal.
    ///
    /// The float is read through its shortest round-trip text, so 1.00005
    /// rounds as the decimal midpoint it prints as rather than as its binary
    /// expansion (1.0000499...). Values whose text does not fit a decimal fall
    /// back to the exact binary expansion.
    ///
    /// Non-finite inputs (NaN from warmup or a guarded division, ±inf) and
    /// magnitudes outside the decimal range become `NotComputed`.
    pub fn from_f64(value: f64, scale: u32) -> Self {
        if !value.is_finite() {
            return Self::NotComputed;
        }
        let decimal = Decimal::from_str(&value.to_string())
            .ok()
            .or_else(|| Decimal::from_f64_retain(value));
        match decimal {
            Some(d) => Self::Value(d.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)),
            None => Self::NotComputed,
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    pub fn decimal(&self) -> Option<Decimal> {
        match self {
            Self::Value(d) => Some(*d),
            Self::NotComputed => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.decimal().and_then(|d| d.to_f64())
    }
}

impl From<Option<Decimal>> for IndicatorValue {
    fn from(value: Option<Decimal>) -> Self {
        match value {
            Some(d) => Self::Value(d),
            None => Self::NotComputed,
        }
    }
}

impl From<IndicatorValue> for Option<Decimal> {
    fn from(value: IndicatorValue) -> Self {
        value.decimal()
    }
}

impl fmt::Display for IndicatorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(d) => write!(f, "{d}"),
            Self::NotComputed => write!(f, "-"),
        }
    }
}

/// Identifier for every field of the fixed indicator schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldId {
    Sma5,
    Sma20,
    Sma60,
    Sma120,
    Sma200,
    Ema12,
    Ema26,
    Rsi14,
    MacdLine,
    MacdSignal,
    MacdHistogram,
    BbUpper,
    BbMiddle,
    BbLower,
    BbPosition,
    BbWidth,
    Volatility20,
    Change1d,
    Change5d,
    Change20d,
    Change60d,
    Change120d,
    VolumeSma5,
    VolumeSma20,
}

impl FieldId {
    pub const ALL: [FieldId; 24] = [
        FieldId::Sma5,
        FieldId::Sma20,
        FieldId::Sma60,
        FieldId::Sma120,
        FieldId::Sma200,
        FieldId::Ema12,
        FieldId::Ema26,
        FieldId::Rsi14,
        FieldId::MacdLine,
        FieldId::MacdSignal,
        FieldId::MacdHistogram,
        FieldId::BbUpper,
        FieldId::BbMiddle,
        FieldId::BbLower,
        FieldId::BbPosition,
        FieldId::BbWidth,
        FieldId::Volatility20,
        FieldId::Change1d,
        FieldId::Change5d,
        FieldId::Change20d,
        FieldId::Change60d,
        FieldId::Change120d,
        FieldId::VolumeSma5,
        FieldId::VolumeSma20,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FieldId::Sma5 => "sma_5",
            FieldId::Sma20 => "sma_20",
            FieldId::Sma60 => "sma_60",
            FieldId::Sma120 => "sma_120",
            FieldId::Sma200 => "sma_200",
            FieldId::Ema12 => "ema_12",
            FieldId::Ema26 => "ema_26",
            FieldId::Rsi14 => "rsi_14",
            FieldId::MacdLine => "macd_line",
            FieldId::MacdSignal => "macd_signal",
            FieldId::MacdHistogram => "macd_histogram",
            FieldId::BbUpper => "bb_upper",
            FieldId::BbMiddle => "bb_middle",
            FieldId::BbLower => "bb_lower",
            FieldId::BbPosition => "bb_position",
            FieldId::BbWidth => "bb_width",
            FieldId::Volatility20 => "volatility_20",
            FieldId::Change1d => "change_1d",
            FieldId::Change5d => "change_5d",
            FieldId::Change20d => "change_20d",
            FieldId::Change60d => "change_60d",
            FieldId::Change120d => "change_120d",
            FieldId::VolumeSma5 => "volume_sma_5",
            FieldId::VolumeSma20 => "volume_sma_20",
        }
    }

    /// Decimal places kept when the value is stored.
    ///
    /// Price-denominated fields keep 4, ratios keep 6, volume averages keep 2.
    pub fn scale(self) -> u32 {
        match self {
            FieldId::BbPosition
            | FieldId::BbWidth
            | FieldId::Volatility20
            | FieldId::Change1d
            | FieldId::Change5d
            | FieldId::Change20d
            | FieldId::Change60d
            | FieldId::Change120d => 6,
            FieldId::VolumeSma5 | FieldId::VolumeSma20 => 2,
            _ => 4,
        }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovingAverages {
    pub sma_5: IndicatorValue,
    pub sma_20: IndicatorValue,
    pub sma_60: IndicatorValue,
    pub sma_120: IndicatorValue,
    pub sma_200: IndicatorValue,
    pub ema_12: IndicatorValue,
    pub ema_26: IndicatorValue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacdTriple {
    pub line: IndicatorValue,
    pub signal: IndicatorValue,
    pub histogram: IndicatorValue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BollingerGroup {
    pub upper: IndicatorValue,
    pub middle: IndicatorValue,
    pub lower: IndicatorValue,
    /// Position of the last close inside the bands, clamped to [0, 1].
    pub position: IndicatorValue,
    /// (upper - lower) / middle.
    pub width: IndicatorValue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceChanges {
    pub change_1d: IndicatorValue,
    pub change_5d: IndicatorValue,
    pub change_20d: IndicatorValue,
    pub change_60d: IndicatorValue,
    pub change_120d: IndicatorValue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeAverages {
    pub volume_sma_5: IndicatorValue,
    pub volume_sma_20: IndicatorValue,
}

/// Indicator vector for one (symbol, date).
///
/// The same type backs the latest snapshot row and a history record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub symbol: String,
    pub calculated_date: NaiveDate,
    /// Source identifier shared by every point of the window.
    pub source: String,
    /// Number of points the window held.
    pub window_len: usize,
    /// BLAKE3 fingerprint of the window contents.
    pub window_hash: String,
    pub moving_averages: MovingAverages,
    pub rsi_14: IndicatorValue,
    pub macd: MacdTriple,
    pub bollinger: BollingerGroup,
    pub volatility_20: IndicatorValue,
    pub changes: PriceChanges,
    pub volume: VolumeAverages,
}

impl IndicatorSet {
    /// An empty set with every field marked not computed.
    pub fn empty(symbol: impl Into<String>, calculated_date: NaiveDate, source: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            calculated_date,
            source: source.into(),
            window_len: 0,
            window_hash: String::new(),
            moving_averages: MovingAverages::default(),
            rsi_14: IndicatorValue::NotComputed,
            macd: MacdTriple::default(),
            bollinger: BollingerGroup::default(),
            volatility_20: IndicatorValue::NotComputed,
            changes: PriceChanges::default(),
            volume: VolumeAverages::default(),
        }
    }

    pub fn get(&self, field: FieldId) -> IndicatorValue {
        match field {
            FieldId::Sma5 => self.moving_averages.sma_5,
            FieldId::Sma20 => self.moving_averages.sma_20,
            FieldId::Sma60 => self.moving_averages.sma_60,
            FieldId::Sma120 => self.moving_averages.sma_120,
            FieldId::Sma200 => self.moving_averages.sma_200,
            FieldId::Ema12 => self.moving_averages.ema_12,
            FieldId::Ema26 => self.moving_averages.ema_26,
            FieldId::Rsi14 => self.rsi_14,
            FieldId::MacdLine => self.macd.line,
            FieldId::MacdSignal => self.macd.signal,
            FieldId::MacdHistogram => self.macd.histogram,
            FieldId::BbUpper => self.bollinger.upper,
            FieldId::BbMiddle => self.bollinger.middle,
            FieldId::BbLower => self.bollinger.lower,
            FieldId::BbPosition => self.bollinger.position,
            FieldId::BbWidth => self.bollinger.width,
            FieldId::Volatility20 => self.volatility_20,
            FieldId::Change1d => self.changes.change_1d,
            FieldId::Change5d => self.changes.change_5d,
            FieldId::Change20d => self.changes.change_20d,
            FieldId::Change60d => self.changes.change_60d,
            FieldId::Change120d => self.changes.change_120d,
            FieldId::VolumeSma5 => self.volume.volume_sma_5,
            FieldId::VolumeSma20 => self.volume.volume_sma_20,
        }
    }

    pub fn field_mut(&mut self, field: FieldId) -> &mut IndicatorValue {
        match field {
            FieldId::Sma5 => &mut self.moving_averages.sma_5,
            FieldId::Sma20 => &mut self.moving_averages.sma_20,
            FieldId::Sma60 => &mut self.moving_averages.sma_60,
            FieldId::Sma120 => &mut self.moving_averages.sma_120,
            FieldId::Sma200 => &mut self.moving_averages.sma_200,
            FieldId::Ema12 => &mut self.moving_averages.ema_12,
            FieldId::Ema26 => &mut self.moving_averages.ema_26,
            FieldId::Rsi14 => &mut self.rsi_14,
            FieldId::MacdLine => &mut self.macd.line,
            FieldId::MacdSignal => &mut self.macd.signal,
            FieldId::MacdHistogram => &mut self.macd.histogram,
            FieldId::BbUpper => &mut self.bollinger.upper,
            FieldId::BbMiddle => &mut self.bollinger.middle,
            FieldId::BbLower => &mut self.bollinger.lower,
            FieldId::BbPosition => &mut self.bollinger.position,
            FieldId::BbWidth => &mut self.bollinger.width,
            FieldId::Volatility20 => &mut self.volatility_20,
            FieldId::Change1d => &mut self.changes.change_1d,
            FieldId::Change5d => &mut self.changes.change_5d,
            FieldId::Change20d => &mut self.changes.change_20d,
            FieldId::Change60d => &mut self.changes.change_60d,
            FieldId::Change120d => &mut self.changes.change_120d,
            FieldId::VolumeSma5 => &mut self.volume.volume_sma_5,
            FieldId::VolumeSma20 => &mut self.volume.volume_sma_20,
        }
    }

    /// Store an engine output into a field, rounding to the field's scale.
    pub fn set_f64(&mut self, field: FieldId, value: f64) {
        *self.field_mut(field) = IndicatorValue::from_f64(value, field.scale());
    }

    /// Fields currently marked not computed, in schema order.
    pub fn missing_fields(&self) -> Vec<FieldId> {
        FieldId::ALL
            .iter()
            .copied()
            .filter(|f| !self.get(*f).is_computed())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        FieldId::ALL.iter().all(|f| self.get(*f).is_computed())
    }
}
