//! Remote fetchers and their shared error taxonomy.

pub mod bea;
pub mod error;
pub mod prices;

pub use bea::{BeaClient, BeaRecord, DatasetRequest, StatsProvider};
pub use error::DataError;
pub use prices::{PriceBar, PriceProvider, YahooProvider};
