//! ScreenLab Core — indicator schema, engine, raw data access, and stores.
//!
//! This crate contains the deterministic half of the system:
//! - Domain types (price points, indicator sets, field identifiers)
//! - Indicator implementations behind a single-series `Indicator` trait
//! - `IndicatorEngine` and the static lookback table
//! - `WindowBuilder` over a `PriceSeriesProvider`
//! - Snapshot and history persistence traits with memory and file backends

pub mod data;
pub mod domain;
pub mod engine;
pub mod fingerprint;
pub mod indicators;
pub mod store;
