//! SectorLab Core: sector macro/market data pipeline.
//!
//! Fetches GDP-by-industry tables from the BEA statistics API, sector ETF
//! prices, and per-ticker daily OHLCV; normalizes everything into typed
//! tables; and caches results as CSV, refetching only when the cached file
//! no longer covers the most recently completed period.
//!
//! - Domain types (frequencies, period keys, normalized tables)
//! - Remote fetchers (BEA client, price provider) with a shared error taxonomy
//! - Shape normalizer (value coercion, code remapping, derived returns)
//! - CSV store with calendar-driven freshness checks
//! - Sequential fetch orchestration with progress reporting

pub mod cache;
pub mod config;
pub mod data;
pub mod fetch;
pub mod normalize;
pub mod schema;
pub mod table;
pub mod universe;

pub use cache::CsvStore;
pub use config::Credentials;
pub use data::{BeaClient, DataError, PriceProvider, YahooProvider};
pub use fetch::{
    fetch_gdp_by_sector, fetch_sector_etfs, fetch_technicals, load_or_update, FetchProgress,
    FetchSummary, StdoutProgress,
};
pub use normalize::UnmappedPolicy;
pub use schema::Frequency;
pub use table::{NormalizedRow, NormalizedTable};
pub use universe::SectorUniverse;
