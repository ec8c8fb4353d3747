//! Window fingerprinting — deterministic identification of the raw data an
//! IndicatorSet was computed from.
//!
//! The hash covers, per point in order: date, close bits, volume, and the
//! window's source identifier. Two windows with the same fingerprint produce
//! the same IndicatorSet.

use crate::domain::PricePoint;

/// BLAKE3 hex digest of a window.
///
/// An empty window hashes to the digest of the empty input.
pub fn window_hash(points: &[PricePoint]) -> String {
    let mut hasher = blake3::Hasher::new();
    if let Some(first) = points.first() {
        hasher.update(first.source.as_bytes());
        hasher.update(&[0u8]);
    }
    for p in points {
        hasher.update(&p.date.to_string().into_bytes());
        hasher.update(&p.close.to_bits().to_le_bytes());
        hasher.update(&p.volume.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_points;

    #[test]
    fn hash_is_deterministic() {
        let points = make_points(&[1.0, 2.0, 3.0]);
        assert_eq!(window_hash(&points), window_hash(&points.clone()));
        assert_eq!(window_hash(&points).len(), 64);
    }

    #[test]
    fn hash_sensitive_to_close() {
        let a = make_points(&[1.0, 2.0, 3.0]);
        let mut b = a.clone();
        b[1].close = 2.000001;
        assert_ne!(window_hash(&a), window_hash(&b));
    }

    #[test]
    fn hash_sensitive_to_source_and_window_start() {
        let a = make_points(&[1.0, 2.0, 3.0]);
        let mut b = a.clone();
        for p in &mut b {
            p.source = "other".into();
        }
        assert_ne!(window_hash(&a), window_hash(&b));
        assert_ne!(window_hash(&a), window_hash(&a[1..]));
    }

    #[test]
    fn hash_ignores_open_high_low() {
        let a = make_points(&[1.0, 2.0, 3.0]);
        let mut b = a.clone();
        b[0].high += 5.0;
        assert_eq!(window_hash(&a), window_hash(&b));
    }
}
