//! Serializable run configuration loaded from TOML.
//!
//! ```toml
//! [engine]
//! bollinger_k = 2.0
//! periods_per_year = 252.0
//!
//! [batch]
//! workers = 4
//! time_budget_secs = 600
//!
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 200
//! max_delay_ms = 5000
//!
//! [fallback]
//! staleness_days = 3
//! timeout_ms = 2000
//! cache_fill = true
//!
//! [data]
//! price_dir = "data/prices"
//! store_dir = "data/indicators"
//! default_source = "vendor_a"
//! ```
//!
//! Every section is optional; missing keys take their defaults.

use crate::retry::RetryPolicy;
use chrono::Duration as DateDuration;
use screenlab_core::engine::EngineParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub engine: EngineSection,
    pub batch: BatchSection,
    pub retry: RetrySection,
    pub fallback: FallbackSection,
    pub data: DataSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub bollinger_k: f64,
    pub periods_per_year: f64,
}

impl Default for EngineSection {
    fn default() -> Self {
        let params = EngineParams::default();
        Self {
            bollinger_k: params.bollinger_k,
            periods_per_year: params.periods_per_year,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSection {
    /// Worker threads for the per-symbol pool.
    pub workers: usize,
    /// Wall-clock budget per cycle; `None` means unbounded.
    pub time_budget_secs: Option<u64>,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            workers: 4,
            time_budget_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackSection {
    /// Calendar days a snapshot may trail the newest raw date.
    pub staleness_days: i64,
    pub timeout_ms: u64,
    /// Write fallback results through to the snapshot store.
    pub cache_fill: bool,
}

impl Default for FallbackSection {
    fn default() -> Self {
        Self {
            staleness_days: 3,
            timeout_ms: 2_000,
            cache_fill: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
    pub price_dir: PathBuf,
    pub store_dir: PathBuf,
    /// Declared raw-data source. `None` accepts any single source.
    pub default_source: Option<String>,
    /// Optional universe TOML (sector → tickers).
    pub universe_file: Option<PathBuf>,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            price_dir: PathBuf::from("data/prices"),
            store_dir: PathBuf::from("data/indicators"),
            default_source: None,
            universe_file: None,
        }
    }
}

impl ScreenConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.workers == 0 {
            return Err(ConfigError::Invalid("batch.workers must be >= 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be >= 1".into()));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        if self.fallback.staleness_days < 0 {
            return Err(ConfigError::Invalid("fallback.staleness_days must be >= 0".into()));
        }
        if !(self.engine.bollinger_k > 0.0 && self.engine.bollinger_k.is_finite()) {
            return Err(ConfigError::Invalid("engine.bollinger_k must be positive".into()));
        }
        if !(self.engine.periods_per_year > 0.0 && self.engine.periods_per_year.is_finite()) {
            return Err(ConfigError::Invalid("engine.periods_per_year must be positive".into()));
        }
        Ok(())
    }

    pub fn engine_params(&self) -> EngineParams {
        EngineParams {
            bollinger_k: self.engine.bollinger_k,
            periods_per_year: self.engine.periods_per_year,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    pub fn time_budget(&self) -> Option<Duration> {
        self.batch.time_budget_secs.map(Duration::from_secs)
    }

    pub fn staleness_margin(&self) -> DateDuration {
        DateDuration::days(self.fallback.staleness_days)
    }

    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_millis(self.fallback.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_all_defaults() {
        let config = ScreenConfig::from_toml("").unwrap();
        assert_eq!(config, ScreenConfig::default());
        assert_eq!(config.batch.workers, 4);
        assert_eq!(config.engine_params(), EngineParams::default());
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let config = ScreenConfig::from_toml(
            r#"
[batch]
workers = 8
time_budget_secs = 30

[data]
default_source = "vendor_a"
"#,
        )
        .unwrap();
        assert_eq!(config.batch.workers, 8);
        assert_eq!(config.time_budget(), Some(Duration::from_secs(30)));
        assert_eq!(config.data.default_source.as_deref(), Some("vendor_a"));
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn rejects_zero_workers() {
        let err = ScreenConfig::from_toml("[batch]\nworkers = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_inverted_delays() {
        let err =
            ScreenConfig::from_toml("[retry]\nbase_delay_ms = 900\nmax_delay_ms = 100\n").unwrap_err();
        assert!(err.to_string().contains("base_delay_ms"));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            ScreenConfig::from_toml("[batch\n").unwrap_err(),
            ConfigError::Parse(_)
        ));
    }

    #[test]
    fn toml_roundtrip() {
        let config = ScreenConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(ScreenConfig::from_toml(&text).unwrap(), config);
    }
}
