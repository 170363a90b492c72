//! Lookup configuration: sector ↔ ETF tickers, BEA table ids, and the
//! industry-code → sector mapping.
//!
//! Stored as a TOML config file. These are immutable constant mappings
//! owned by the caller and injected wherever remapping happens, never
//! module-level mutable state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorUniverse {
    /// GICS sector name → ETF ticker tracking it.
    pub sector_etfs: BTreeMap<String, String>,
    /// BEA GDPbyIndustry table id → metric column name.
    pub bea_tables: BTreeMap<String, String>,
    /// BEA industry code → sector name.
    pub industry_sectors: BTreeMap<String, String>,
}

impl SectorUniverse {
    /// Load a universe from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("read universe file: {e}"))?;
        Self::from_toml(&content)
    }

    /// Parse a universe from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("parse universe TOML: {e}"))
    }

    /// Serialize the universe to TOML.
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("serialize universe: {e}"))
    }

    /// ETF tickers across all sectors.
    pub fn tickers(&self) -> Vec<&str> {
        self.sector_etfs.values().map(|t| t.as_str()).collect()
    }

    pub fn sector_names(&self) -> Vec<&str> {
        self.sector_etfs.keys().map(|s| s.as_str()).collect()
    }

    /// Default US universe: the eleven GICS sectors with their SPDR ETFs,
    /// the four GDP-by-industry tables, and a coarse industry-code map.
    pub fn default_us() -> Self {
        let sector_etfs = [
            ("Technology", "XLK"),
            ("Communication Services", "XLC"),
            ("Financials", "XLF"),
            ("Real Estate", "XLRE"),
            ("Energy", "XLE"),
            ("Utilities", "XLU"),
            ("Industrials", "XLI"),
            ("Materials", "XLB"),
            ("Consumer Discretionary", "XLY"),
            ("Consumer Staples", "XLP"),
            ("Health Care", "XLV"),
        ]
        .into_iter()
        .map(|(s, t)| (s.to_string(), t.to_string()))
        .collect();

        let bea_tables = [
            ("1", "VA"),             // Value added
            ("5", "VA_percentGDP"),  // Percent contribution to GDP
            ("15", "GO"),            // Gross output
            ("208", "Wages"),        // Compensation
        ]
        .into_iter()
        .map(|(id, m)| (id.to_string(), m.to_string()))
        .collect();

        let industry_sectors = [
            ("21", "Energy"),                     // Mining
            ("22", "Utilities"),
            ("23", "Industrials"),                // Construction
            ("31G", "Industrials"),               // Manufacturing
            ("33DG", "Industrials"),              // Durable goods
            ("31ND", "Consumer Staples"),         // Nondurable goods
            ("42", "Industrials"),                // Wholesale trade
            ("44RT", "Consumer Discretionary"),   // Retail trade
            ("48TW", "Industrials"),              // Transportation and warehousing
            ("51", "Communication Services"),     // Information
            ("52", "Financials"),                 // Finance and insurance
            ("53", "Real Estate"),
            ("54", "Technology"),                 // Professional and technical services
            ("62", "Health Care"),
            ("72", "Consumer Discretionary"),     // Accommodation and food services
        ]
        .into_iter()
        .map(|(c, s)| (c.to_string(), s.to_string()))
        .collect();

        Self {
            sector_etfs,
            bea_tables,
            industry_sectors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_universe_covers_eleven_sectors() {
        let u = SectorUniverse::default_us();
        assert_eq!(u.sector_etfs.len(), 11);
        assert_eq!(u.sector_etfs.get("Technology").unwrap(), "XLK");
        assert_eq!(u.sector_etfs.get("Health Care").unwrap(), "XLV");
        assert!(u.tickers().contains(&"XLE"));
    }

    #[test]
    fn default_tables_name_their_metrics() {
        let u = SectorUniverse::default_us();
        assert_eq!(u.bea_tables.get("1").unwrap(), "VA");
        assert_eq!(u.bea_tables.get("208").unwrap(), "Wages");
    }

    #[test]
    fn toml_roundtrip() {
        let u = SectorUniverse::default_us();
        let toml_str = u.to_toml().unwrap();
        let parsed = SectorUniverse::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.sector_etfs, u.sector_etfs);
        assert_eq!(parsed.bea_tables, u.bea_tables);
        assert_eq!(parsed.industry_sectors, u.industry_sectors);
    }

    #[test]
    fn industry_codes_map_into_known_sectors() {
        let u = SectorUniverse::default_us();
        for sector in u.industry_sectors.values() {
            assert!(
                u.sector_etfs.contains_key(sector),
                "unknown sector {sector}"
            );
        }
    }
}
