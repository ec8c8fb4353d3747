//! Symbol universe — sector-organized ticker lists loaded from TOML.
//!
//! ```toml
//! [sectors]
//! Technology = ["AAPL", "MSFT"]
//! ETFs = ["SPY"]
//! ```

use super::provider::{validate_symbol, DataError, SymbolUniverse};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Universe {
    pub sectors: BTreeMap<String, Vec<String>>,
}

impl Universe {
    pub fn from_file(path: &Path) -> Result<Self, DataError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DataError::Universe(format!("read universe file {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate: every ticker must be usable as a storage key.
    pub fn from_toml(content: &str) -> Result<Self, DataError> {
        let universe: Self = toml::from_str(content)
            .map_err(|e| DataError::Universe(format!("parse universe TOML: {e}")))?;
        for ticker in universe.sectors.values().flatten() {
            validate_symbol(ticker)?;
        }
        Ok(universe)
    }

    /// Every ticker across all sectors, deduplicated and sorted.
    pub fn all_tickers(&self) -> Vec<&str> {
        let unique: BTreeSet<&str> = self
            .sectors
            .values()
            .flat_map(|tickers| tickers.iter().map(|t| t.as_str()))
            .collect();
        unique.into_iter().collect()
    }

    pub fn sector_tickers(&self, sector: &str) -> Option<&[String]> {
        self.sectors.get(sector).map(|v| v.as_slice())
    }

    pub fn sector_names(&self) -> Vec<&str> {
        self.sectors.keys().map(|s| s.as_str()).collect()
    }

    /// Number of distinct tickers.
    pub fn ticker_count(&self) -> usize {
        self.all_tickers().len()
    }

    pub fn to_toml(&self) -> Result<String, DataError> {
        toml::to_string_pretty(self).map_err(|e| DataError::Universe(format!("serialize universe: {e}")))
    }
}

impl SymbolUniverse for Universe {
    fn list_active_symbols(&self) -> Result<Vec<String>, DataError> {
        Ok(self.all_tickers().into_iter().map(String::from).collect())
    }
}
