//! PricePoint — the raw market data unit consumed by the engine.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// OHLCV point for a single symbol on a single day, tagged with the data
/// source that produced it.
///
/// Points are owned by the ingestion side. The engine only reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub source: String,
}

impl PricePoint {
    /// Returns true if any OHLC field is NaN (void point).
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }

    /// Read one numeric field of the point.
    pub fn field(&self, field: PriceField) -> f64 {
        match field {
            PriceField::Close => self.close,
            PriceField::Volume => self.volume as f64,
        }
    }
}

/// Which numeric column of a point an indicator reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceField {
    Close,
    Volume,
}

impl PriceField {
    pub fn prefix(self) -> &'static str {
        match self {
            PriceField::Close => "",
            PriceField::Volume => "volume_",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_point() -> PricePoint {
        PricePoint {
            symbol: "SPY".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: 100.0,
            high: 105.0,
            low: 98.0,
            close: 103.0,
            volume: 50_000,
            source: "vendor_a".into(),
        }
    }

    #[test]
    fn point_is_sane() {
        assert!(sample_point().is_sane());
    }

    #[test]
    fn point_detects_void() {
        let mut point = sample_point();
        point.close = f64::NAN;
        assert!(point.is_void());
        assert!(!point.is_sane());
    }

    #[test]
    fn point_detects_insane_high_low() {
        let mut point = sample_point();
        point.high = 97.0;
        assert!(!point.is_sane());
    }

    #[test]
    fn field_reads_volume_as_float() {
        let point = sample_point();
        assert_eq!(point.field(PriceField::Close), 103.0);
        assert_eq!(point.field(PriceField::Volume), 50_000.0);
    }
}
