//! Static per-field minimum-lookback table.
//!
//! `min_points(field)` is the number of points (inclusive of the target)
//! that must be present in a window before the field may be computed.

use crate::domain::FieldId;

/// Longest lookback across the schema (SMA 200).
pub const MAX_LOOKBACK: usize = 200;

/// Schema order, one entry per field.
pub const LOOKBACK_TABLE: [(FieldId, usize); 24] = [
    (FieldId::Sma5, 5),
    (FieldId::Sma20, 20),
    (FieldId::Sma60, 60),
    (FieldId::Sma120, 120),
    (FieldId::Sma200, 200),
    (FieldId::Ema12, 12),
    (FieldId::Ema26, 26),
    (FieldId::Rsi14, 15),
    (FieldId::MacdLine, 26),
    (FieldId::MacdSignal, 35),
    (FieldId::MacdHistogram, 35),
    (FieldId::BbUpper, 20),
    (FieldId::BbMiddle, 20),
    (FieldId::BbLower, 20),
    (FieldId::BbPosition, 20),
    (FieldId::BbWidth, 20),
    (FieldId::Volatility20, 21),
    (FieldId::Change1d, 2),
    (FieldId::Change5d, 6),
    (FieldId::Change20d, 21),
    (FieldId::Change60d, 61),
    (FieldId::Change120d, 121),
    (FieldId::VolumeSma5, 5),
    (FieldId::VolumeSma20, 20),
];

pub fn min_points(field: FieldId) -> usize {
    LOOKBACK_TABLE
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, n)| *n)
        .unwrap_or(MAX_LOOKBACK)
}

/// Calendar days to request from a provider so that `points` trading days
/// are covered (weekends plus a holiday margin).
pub fn calendar_span_days(points: usize) -> i64 {
    (points * 3 / 2 + 14) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_covers_every_field_in_schema_order() {
        let fields: Vec<FieldId> = LOOKBACK_TABLE.iter().map(|(f, _)| *f).collect();
        assert_eq!(fields, FieldId::ALL.to_vec());
    }

    #[test]
    fn longest_lookback_is_table_max() {
        let max = LOOKBACK_TABLE.iter().map(|(_, n)| *n).max().unwrap();
        assert_eq!(max, MAX_LOOKBACK);
    }

    #[test]
    fn known_entries() {
        assert_eq!(min_points(FieldId::Rsi14), 15);
        assert_eq!(min_points(FieldId::MacdSignal), 35);
        assert_eq!(min_points(FieldId::Volatility20), 21);
        assert_eq!(min_points(FieldId::Change120d), 121);
    }

    #[test]
    fn calendar_span_covers_trading_days() {
        // ~252 trading days per 365 calendar days
        assert!(calendar_span_days(MAX_LOOKBACK) as f64 >= MAX_LOOKBACK as f64 * 365.0 / 252.0);
    }
}
