//! ScreenLab Runner — calculation cycles over the core engine.
//!
//! This crate builds on `screenlab-core` to provide:
//! - TOML run configuration
//! - Bounded retry with exponential backoff for storage writes
//! - Incremental scheduling (daily and backfill)
//! - Batch orchestration on a rayon pool with time budget and cancel flag
//! - Read-time fallback with cache fill
//! - The consumer-facing `IndicatorService`
//! - CSV / JSON export

pub mod config;
pub mod cycle;
pub mod export;
pub mod fallback;
pub mod orchestrator;
pub mod retry;
pub mod scheduler;
pub mod service;

pub use config::{ConfigError, ScreenConfig};
pub use cycle::{
    CycleError, CycleReport, CycleRequest, FailureReason, SkipReason, SymbolFailure,
    SymbolOutcome, SymbolStatus,
};
pub use export::{export_history_csv, export_report_json, history_csv_string, write_history_csv};
pub use fallback::{FallbackError, FallbackResolver, Resolution, ResolutionOrigin};
pub use orchestrator::BatchOrchestrator;
pub use retry::{decide, with_retry, RetryDecision, RetryPolicy};
pub use scheduler::{IncrementalScheduler, ScheduleMode, SymbolPlan};
pub use service::IndicatorService;
