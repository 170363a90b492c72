//! Fetch orchestration: freshness-gated pipelines for GDP-by-sector,
//! sector ETF returns, and per-ticker technicals.
//!
//! Every pipeline is strictly sequential: one blocking request at a time,
//! no fan-out. The GDP and ETF pipelines are all-or-nothing: any failed
//! table or sector aborts the whole fetch rather than producing a partial
//! merged table. The technicals batch records per-ticker failures in its
//! summary instead, since each ticker lands in its own file.

use crate::cache::CsvStore;
use crate::data::{DataError, DatasetRequest, PriceProvider, StatsProvider};
use crate::normalize::{self, UnmappedPolicy};
use crate::schema::Frequency;
use crate::table::NormalizedTable;
use crate::universe::SectorUniverse;
use chrono::NaiveDate;

/// Progress callback for multi-ticker operations.
pub trait FetchProgress {
    /// Called when starting to fetch a ticker.
    fn on_start(&self, symbol: &str, index: usize, total: usize);

    /// Called when a ticker fetch completes.
    fn on_complete(&self, symbol: &str, index: usize, total: usize, result: &Result<(), DataError>);

    /// Called when the entire batch is done.
    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Simple progress reporter that prints to stdout.
pub struct StdoutProgress;

impl FetchProgress for StdoutProgress {
    fn on_start(&self, symbol: &str, index: usize, total: usize) {
        println!("[{}/{}] Fetching {symbol}...", index + 1, total);
    }

    fn on_complete(
        &self,
        symbol: &str,
        _index: usize,
        _total: usize,
        result: &Result<(), DataError>,
    ) {
        match result {
            Ok(()) => println!("  OK: {symbol}"),
            Err(e) => println!("  FAIL: {symbol}: {e}"),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        println!("\nFetch complete: {succeeded}/{total} succeeded, {failed} failed");
    }
}

/// Silent progress reporter, for library callers and tests.
pub struct NoProgress;

impl FetchProgress for NoProgress {
    fn on_start(&self, _: &str, _: usize, _: usize) {}
    fn on_complete(&self, _: &str, _: usize, _: usize, _: &Result<(), DataError>) {}
    fn on_batch_complete(&self, _: usize, _: usize, _: usize) {}
}

/// Return the cached table when it is fresh; otherwise run `refresh`, save
/// its result, and return it. `force` skips the freshness check.
pub fn load_or_update<F>(
    store: &CsvStore,
    name: &str,
    frequency: Frequency,
    force: bool,
    refresh: F,
) -> Result<NormalizedTable, DataError>
where
    F: FnOnce() -> Result<NormalizedTable, DataError>,
{
    load_or_update_at(
        store,
        name,
        frequency,
        force,
        chrono::Local::now().date_naive(),
        refresh,
    )
}

/// `load_or_update` against an explicit calendar date.
pub fn load_or_update_at<F>(
    store: &CsvStore,
    name: &str,
    frequency: Frequency,
    force: bool,
    today: NaiveDate,
    refresh: F,
) -> Result<NormalizedTable, DataError>
where
    F: FnOnce() -> Result<NormalizedTable, DataError>,
{
    if !force && store.is_up_to_date_at(name, frequency, today) {
        return store.load(name);
    }

    let table = refresh()?;
    store.save(name, &table)?;
    Ok(table)
}

/// Fetch each configured GDP-by-industry table, outer-join them on
/// (period, industry), and remap industry codes to sector names.
///
/// A table that fails (transport, schema, or zero rows) aborts the whole
/// fetch; there is no partial merged table.
pub fn fetch_gdp_by_sector(
    provider: &dyn StatsProvider,
    universe: &SectorUniverse,
    years: &[i32],
    policy: UnmappedPolicy,
) -> Result<NormalizedTable, DataError> {
    let mut combined: Option<NormalizedTable> = None;

    for (table_id, metric) in &universe.bea_tables {
        let request = DatasetRequest::gdp_by_industry(table_id.clone(), years.to_vec());
        let records = provider.table_records(&request)?;
        let table = normalize::normalize_records(&records, metric)?;

        combined = Some(match combined {
            None => table,
            Some(joined) => joined.outer_join(&table),
        });
    }

    let joined = combined
        .ok_or_else(|| DataError::Schema("no BEA tables configured in universe".into()))?;

    let mut mapped = normalize::map_industries(&joined, &universe.industry_sectors, policy);
    mapped.sort();
    Ok(mapped)
}

/// Fetch daily closes for every sector ETF, collapse to quarterly last
/// closes, and append the per-sector QoQ return.
///
/// Sectors are fetched one at a time; any sector failure aborts the fetch.
pub fn fetch_sector_etfs(
    provider: &dyn PriceProvider,
    universe: &SectorUniverse,
    start_year: i32,
    today: NaiveDate,
) -> Result<NormalizedTable, DataError> {
    let start = NaiveDate::from_ymd_opt(start_year, 1, 1)
        .ok_or_else(|| DataError::Schema(format!("invalid start year {start_year}")))?;

    let mut combined: Option<NormalizedTable> = None;

    for (sector, ticker) in &universe.sector_etfs {
        let bars = provider.daily_bars(ticker, start, today)?;
        let quarterly = normalize::quarterly_last_close(sector, Some(ticker), &bars, "Price");

        combined = Some(match combined {
            None => quarterly,
            Some(mut acc) => {
                acc.rows.extend(quarterly.rows);
                acc
            }
        });
    }

    let table =
        combined.ok_or_else(|| DataError::Schema("no sector ETFs configured in universe".into()))?;

    let mut with_returns = normalize::period_over_period(&table, "Price", "Return_QoQ");
    with_returns.sort();
    Ok(with_returns)
}

/// Summary of a technicals batch.
#[derive(Debug)]
pub struct FetchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<(String, DataError)>,
}

impl FetchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// File name of a ticker's technicals CSV, relative to the cache root.
pub fn technicals_file(ticker: &str) -> String {
    format!("technicals/{}.csv", ticker.to_uppercase())
}

/// Download daily OHLCV for each ticker into its own CSV, one ticker at a
/// time. Per-ticker failures are recorded in the summary and the batch
/// continues; the caller decides whether a partial batch is acceptable.
pub fn fetch_technicals(
    provider: &dyn PriceProvider,
    store: &CsvStore,
    tickers: &[&str],
    start: NaiveDate,
    end: NaiveDate,
    progress: &dyn FetchProgress,
) -> FetchSummary {
    let total = tickers.len();
    let mut succeeded = 0;
    let mut failed = 0;
    let mut errors: Vec<(String, DataError)> = Vec::new();

    for (i, ticker) in tickers.iter().enumerate() {
        let symbol = ticker.to_uppercase();
        progress.on_start(&symbol, i, total);

        let result = provider
            .daily_bars(&symbol, start, end)
            .and_then(|bars| store.save_bars(&technicals_file(&symbol), &bars));
        progress.on_complete(&symbol, i, total, &result);

        match result {
            Ok(()) => succeeded += 1,
            Err(e) => {
                errors.push((symbol, e));
                failed += 1;
            }
        }
    }

    progress.on_batch_complete(succeeded, failed, total);

    FetchSummary {
        total,
        succeeded,
        failed,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BeaRecord, PriceBar};
    use crate::schema::PeriodKey;
    use crate::table::NormalizedRow;
    use std::cell::Cell;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // ── Fixtures ────────────────────────────────────────────────────

    /// Stats fixture: table id → records, anything else errors.
    struct FixtureStats {
        tables: BTreeMap<String, Vec<BeaRecord>>,
    }

    impl StatsProvider for FixtureStats {
        fn table_records(&self, request: &DatasetRequest) -> Result<Vec<BeaRecord>, DataError> {
            match self.tables.get(&request.table_id) {
                Some(records) if !records.is_empty() => Ok(records.clone()),
                _ => Err(DataError::Schema(format!(
                    "BEA table {} returned zero rows",
                    request.table_id
                ))),
            }
        }
    }

    fn bea_record(year: &str, industry: &str, value: &str) -> BeaRecord {
        serde_json::from_str(&format!(
            r#"{{"Year": "{year}", "Industry": "{industry}", "DataValue": "{value}"}}"#
        ))
        .unwrap()
    }

    /// Price fixture: symbol → bars, anything else is a schema error.
    struct FixturePrices {
        bars: BTreeMap<String, Vec<PriceBar>>,
    }

    impl PriceProvider for FixturePrices {
        fn name(&self) -> &str {
            "fixture"
        }

        fn daily_bars(
            &self,
            symbol: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<PriceBar>, DataError> {
            self.bars
                .get(symbol)
                .cloned()
                .ok_or_else(|| DataError::Schema(format!("{symbol}: zero usable bars")))
        }
    }

    fn close_bar(date: NaiveDate, close: f64) -> PriceBar {
        PriceBar {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 100,
        }
    }

    fn two_sector_universe() -> SectorUniverse {
        let mut u = SectorUniverse::default_us();
        u.sector_etfs = [("Energy", "XLE"), ("Technology", "XLK")]
            .into_iter()
            .map(|(s, t)| (s.to_string(), t.to_string()))
            .collect();
        u
    }

    // ── load_or_update ──────────────────────────────────────────────

    fn annual_table(year: i32) -> NormalizedTable {
        let mut t = NormalizedTable::new("Sector", vec!["VA".to_string()]);
        t.rows.push(
            NormalizedRow::new(PeriodKey::annual(year), "Financials").with_metric("VA", Some(1.0)),
        );
        t
    }

    #[test]
    fn fresh_cache_is_loaded_without_refetch() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path());
        store.save("gdp.csv", &annual_table(2023)).unwrap();

        let called = Cell::new(false);
        let table = load_or_update_at(
            &store,
            "gdp.csv",
            Frequency::Annual,
            false,
            day(2023, 6, 1),
            || {
                called.set(true);
                Ok(annual_table(2024))
            },
        )
        .unwrap();

        assert!(!called.get());
        assert_eq!(table.max_period(), Some(PeriodKey::annual(2023)));
    }

    #[test]
    fn stale_cache_triggers_refetch_and_save() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path());
        store.save("gdp.csv", &annual_table(2022)).unwrap();

        let table = load_or_update_at(
            &store,
            "gdp.csv",
            Frequency::Annual,
            false,
            day(2023, 6, 1),
            || Ok(annual_table(2023)),
        )
        .unwrap();

        assert_eq!(table.max_period(), Some(PeriodKey::annual(2023)));
        // The file itself was refreshed, not just the in-memory result.
        let reloaded = store.load("gdp.csv").unwrap();
        assert_eq!(reloaded.max_period(), Some(PeriodKey::annual(2023)));
    }

    #[test]
    fn stale_quarterly_file_is_refetched_to_current_quarter() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path());

        let mut q1 = NormalizedTable::new("Sector", vec!["Price".to_string()]);
        q1.rows.push(
            NormalizedRow::new(PeriodKey::quarterly(2023, 1), "Energy")
                .with_metric("Price", Some(50.0)),
        );
        store.save("etf.csv", &q1).unwrap();

        let mut q3 = q1.clone();
        q3.rows.push(
            NormalizedRow::new(PeriodKey::quarterly(2023, 3), "Energy")
                .with_metric("Price", Some(55.0)),
        );

        let table = load_or_update_at(
            &store,
            "etf.csv",
            Frequency::Quarterly,
            false,
            day(2023, 8, 15), // Q3 2023
            || Ok(q3.clone()),
        )
        .unwrap();

        assert!(table.max_period() >= Some(PeriodKey::quarterly(2023, 3)));
        assert!(store.is_up_to_date_at("etf.csv", Frequency::Quarterly, day(2023, 8, 15)));
    }

    #[test]
    fn force_skips_freshness_check() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path());
        store.save("gdp.csv", &annual_table(2023)).unwrap();

        let table = load_or_update_at(
            &store,
            "gdp.csv",
            Frequency::Annual,
            true,
            day(2023, 6, 1),
            || Ok(annual_table(2024)),
        )
        .unwrap();

        assert_eq!(table.max_period(), Some(PeriodKey::annual(2024)));
    }

    #[test]
    fn failed_refresh_leaves_cache_untouched() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path());
        store.save("gdp.csv", &annual_table(2022)).unwrap();

        let result = load_or_update_at(
            &store,
            "gdp.csv",
            Frequency::Annual,
            false,
            day(2023, 6, 1),
            || Err(DataError::Transport("HTTP 503".into())),
        );

        assert!(matches!(result, Err(DataError::Transport(_))));
        let old = store.load("gdp.csv").unwrap();
        assert_eq!(old.max_period(), Some(PeriodKey::annual(2022)));
    }

    // ── GDP pipeline ────────────────────────────────────────────────

    #[test]
    fn gdp_pipeline_joins_tables_and_maps_sectors() {
        let mut universe = SectorUniverse::default_us();
        universe.bea_tables = [("1", "VA"), ("15", "GO")]
            .into_iter()
            .map(|(id, m)| (id.to_string(), m.to_string()))
            .collect();

        let stats = FixtureStats {
            tables: [
                (
                    "1".to_string(),
                    vec![
                        bea_record("2023", "52", "100"),
                        bea_record("2023", "53", "200"),
                    ],
                ),
                // "53" (Real Estate) has no gross-output row.
                ("15".to_string(), vec![bea_record("2023", "52", "300")]),
            ]
            .into(),
        };

        let table =
            fetch_gdp_by_sector(&stats, &universe, &[2023], UnmappedPolicy::Drop).unwrap();

        assert_eq!(table.category_column, "Sector");
        assert_eq!(table.metric_columns, vec!["VA", "GO"]);

        let financials = table
            .rows
            .iter()
            .find(|r| r.category == "Financials")
            .unwrap();
        assert_eq!(financials.metric("VA"), Some(100.0));
        assert_eq!(financials.metric("GO"), Some(300.0));

        let real_estate = table
            .rows
            .iter()
            .find(|r| r.category == "Real Estate")
            .unwrap();
        assert_eq!(real_estate.metric("VA"), Some(200.0));
        assert_eq!(real_estate.metric("GO"), None);
    }

    #[test]
    fn gdp_pipeline_aborts_when_any_table_is_empty() {
        let mut universe = SectorUniverse::default_us();
        universe.bea_tables = [("1", "VA"), ("15", "GO")]
            .into_iter()
            .map(|(id, m)| (id.to_string(), m.to_string()))
            .collect();

        // Table 15 is missing from the fixture → zero rows → schema error.
        let stats = FixtureStats {
            tables: [("1".to_string(), vec![bea_record("2023", "52", "100")])].into(),
        };

        assert!(matches!(
            fetch_gdp_by_sector(&stats, &universe, &[2023], UnmappedPolicy::Drop),
            Err(DataError::Schema(_))
        ));
    }

    #[test]
    fn gdp_pipeline_drops_unmapped_codes_under_drop_policy() {
        let mut universe = SectorUniverse::default_us();
        universe.bea_tables = [("1".to_string(), "VA".to_string())].into();

        let stats = FixtureStats {
            tables: [(
                "1".to_string(),
                vec![
                    bea_record("2023", "52", "100"),
                    bea_record("2023", "GSLG", "999"), // state & local gov: unmapped
                ],
            )]
            .into(),
        };

        let dropped =
            fetch_gdp_by_sector(&stats, &universe, &[2023], UnmappedPolicy::Drop).unwrap();
        assert_eq!(dropped.len(), 1);

        let kept =
            fetch_gdp_by_sector(&stats, &universe, &[2023], UnmappedPolicy::Keep).unwrap();
        assert_eq!(kept.len(), 2);
        assert!(kept.rows.iter().any(|r| r.category == "GSLG"));
    }

    // ── ETF pipeline ────────────────────────────────────────────────

    #[test]
    fn etf_pipeline_builds_quarterly_returns_per_sector() {
        let universe = two_sector_universe();
        let prices = FixturePrices {
            bars: [
                (
                    "XLE".to_string(),
                    vec![
                        close_bar(day(2023, 3, 31), 100.0),
                        close_bar(day(2023, 6, 30), 110.0),
                        close_bar(day(2023, 9, 29), 99.0),
                    ],
                ),
                (
                    "XLK".to_string(),
                    vec![
                        close_bar(day(2023, 3, 31), 50.0),
                        close_bar(day(2023, 6, 30), 55.0),
                    ],
                ),
            ]
            .into(),
        };

        let table =
            fetch_sector_etfs(&prices, &universe, 2023, day(2023, 10, 1)).unwrap();

        assert_eq!(table.category_column, "Sector");
        assert_eq!(table.label_column.as_deref(), Some("Ticker"));
        assert_eq!(table.metric_columns, vec!["Price", "Return_QoQ"]);

        let energy: Vec<_> = table
            .rows
            .iter()
            .filter(|r| r.category == "Energy")
            .collect();
        assert_eq!(energy.len(), 3);
        assert_eq!(energy[0].label.as_deref(), Some("XLE"));
        assert_eq!(energy[0].metric("Return_QoQ"), None);
        assert!((energy[1].metric("Return_QoQ").unwrap() - 0.10).abs() < 1e-6);
        assert!((energy[2].metric("Return_QoQ").unwrap() + 0.10).abs() < 1e-6);

        let tech: Vec<_> = table
            .rows
            .iter()
            .filter(|r| r.category == "Technology")
            .collect();
        assert_eq!(tech.len(), 2);
        assert!((tech[1].metric("Return_QoQ").unwrap() - 0.10).abs() < 1e-6);
    }

    #[test]
    fn etf_pipeline_aborts_on_missing_sector_data() {
        let universe = two_sector_universe();
        let prices = FixturePrices {
            bars: [(
                "XLE".to_string(),
                vec![close_bar(day(2023, 3, 31), 100.0)],
            )]
            .into(),
        };

        // XLK has no data → whole fetch fails, no partial table.
        assert!(matches!(
            fetch_sector_etfs(&prices, &universe, 2023, day(2023, 10, 1)),
            Err(DataError::Schema(_))
        ));
    }

    // ── Technicals batch ────────────────────────────────────────────

    #[test]
    fn technicals_batch_writes_per_ticker_files_and_reports_failures() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path());
        let prices = FixturePrices {
            bars: [(
                "AAPL".to_string(),
                vec![close_bar(day(2024, 1, 2), 190.0)],
            )]
            .into(),
        };

        let summary = fetch_technicals(
            &prices,
            &store,
            &["aapl", "ZZZZ"],
            day(2024, 1, 1),
            day(2024, 2, 1),
            &NoProgress,
        );

        assert_eq!(summary.total, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert!(!summary.all_succeeded());
        assert_eq!(summary.errors[0].0, "ZZZZ");

        // Lowercase input still lands in the uppercase file.
        let bars = store.load_bars(&technicals_file("AAPL")).unwrap();
        assert_eq!(bars[0].close, 190.0);
        assert!(!store.path(&technicals_file("ZZZZ")).exists());
    }
}
