//! Raw price access: provider traits, in-memory and Parquet providers, and the
//! symbol universe.

pub mod memory;
pub mod parquet_store;
pub mod provider;
pub mod universe;

pub use memory::MemoryPriceProvider;
pub use parquet_store::{ParquetPriceStore, PriceStatus, StoreMeta};
pub use provider::{validate_symbol, DataError, PriceSeriesProvider, SymbolUniverse};
pub use universe::Universe;
