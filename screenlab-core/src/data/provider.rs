//! Raw price provider traits and structured error types.
//!
//! `PriceSeriesProvider` abstracts over where raw points live (Parquet files,
//! an in-memory map, an ingestion database) so the engine can be driven and
//! mocked without knowing the storage.

use crate::domain::PricePoint;
use chrono::NaiveDate;
use thiserror::Error;

/// Structured error types for raw-data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("source mismatch for {symbol}: window spans {sources:?}")]
    SourceMismatch {
        symbol: String,
        sources: Vec<String>,
    },

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("invalid symbol '{symbol}': {reason}")]
    InvalidSymbol { symbol: String, reason: String },

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("corrupt price partition {path}: {reason}")]
    CorruptPartition { path: String, reason: String },

    #[error("universe error: {0}")]
    Universe(String),

    #[error("data error: {0}")]
    Other(String),
}

/// Supplies ordered raw points for one symbol.
///
/// `source = None` returns whatever the provider holds; `Some(id)` restricts
/// to points tagged with that source. A symbol with no points in range yields
/// an empty vector, not an error.
pub trait PriceSeriesProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    fn get_price_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        source: Option<&str>,
    ) -> Result<Vec<PricePoint>, DataError>;

    /// Most recent raw date held for a symbol.
    fn latest_date(&self, symbol: &str, source: Option<&str>) -> Result<Option<NaiveDate>, DataError> {
        let points = self.get_price_series(symbol, NaiveDate::MIN, NaiveDate::MAX, source)?;
        Ok(points.iter().map(|p| p.date).max())
    }
}

/// Lists the symbols a calculation cycle covers when none are given.
pub trait SymbolUniverse: Send + Sync {
    fn list_active_symbols(&self) -> Result<Vec<String>, DataError>;
}

impl SymbolUniverse for Vec<String> {
    fn list_active_symbols(&self) -> Result<Vec<String>, DataError> {
        Ok(self.clone())
    }
}

/// Reject symbols that cannot safely become a path component.
pub fn validate_symbol(symbol: &str) -> Result<(), DataError> {
    let reason = if symbol.is_empty() {
        Some("empty symbol")
    } else if symbol.contains(['/', '\\']) || symbol == "." || symbol == ".." {
        Some("contains a path separator")
    } else if symbol.chars().any(char::is_whitespace) {
        Some("contains whitespace")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(DataError::InvalidSymbol {
            symbol: symbol.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
