//! SectorLab CLI: fetch and cache sector macro/market data.
//!
//! Commands:
//! - `gdp`: BEA GDP-by-industry tables joined into one sector CSV
//! - `etf`: sector ETF quarterly closes with QoQ returns
//! - `technicals`: per-ticker daily OHLCV CSVs
//! - `cache status`: freshness report for the cache directory

use anyhow::{anyhow, Result};
use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use sectorlab_core::fetch::{self, StdoutProgress};
use sectorlab_core::normalize::UnmappedPolicy;
use sectorlab_core::{
    BeaClient, Credentials, CsvStore, Frequency, SectorUniverse, YahooProvider,
};

/// Cache file for the annual GDP-by-sector table.
const GDP_FILE: &str = "gdp_by_sector.csv";
/// Cache file for the quarterly sector-ETF table.
const ETF_FILE: &str = "sector_etf_quarterly.csv";

#[derive(Parser)]
#[command(
    name = "sectorlab",
    about = "Fetch and cache sector macro/market data"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch BEA GDP-by-industry tables and cache one joined sector CSV.
    Gdp {
        /// First year to request. Defaults to four years before the current year.
        #[arg(long)]
        start_year: Option<i32>,

        /// Keep rows whose industry code has no sector mapping (default: drop them).
        #[arg(long, default_value_t = false)]
        keep_unmapped: bool,

        /// Force refetch even if the cached file is fresh.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Universe TOML file. Defaults to the built-in US universe.
        #[arg(long)]
        universe: Option<PathBuf>,

        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
    /// Fetch sector ETF prices and cache quarterly closes with QoQ returns.
    Etf {
        /// First year of daily history. Defaults to ten years ago.
        #[arg(long)]
        start_year: Option<i32>,

        /// Force refetch even if the cached file is fresh.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Universe TOML file. Defaults to the built-in US universe.
        #[arg(long)]
        universe: Option<PathBuf>,

        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
    /// Download per-ticker daily OHLCV CSVs.
    Technicals {
        /// Tickers to download (e.g., AAPL MSFT NVDA).
        #[arg(required = true)]
        tickers: Vec<String>,

        /// Start date (YYYY-MM-DD). Defaults to 10 years ago.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<String>,

        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report which cached files exist and whether they are still fresh.
    Status {
        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    // Pick up BEA_API_KEY from a local .env, when present.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Gdp {
            start_year,
            keep_unmapped,
            force,
            universe,
            cache_dir,
        } => run_gdp(start_year, keep_unmapped, force, universe, cache_dir),
        Commands::Etf {
            start_year,
            force,
            universe,
            cache_dir,
        } => run_etf(start_year, force, universe, cache_dir),
        Commands::Technicals {
            tickers,
            start,
            end,
            cache_dir,
        } => run_technicals(tickers, start, end, cache_dir),
        Commands::Cache { action } => match action {
            CacheAction::Status { cache_dir } => run_cache_status(&cache_dir),
        },
    }
}

fn load_universe(path: Option<PathBuf>) -> Result<SectorUniverse> {
    match path {
        Some(p) => SectorUniverse::from_file(&p).map_err(|e| anyhow!(e)),
        None => Ok(SectorUniverse::default_us()),
    }
}

fn run_gdp(
    start_year: Option<i32>,
    keep_unmapped: bool,
    force: bool,
    universe: Option<PathBuf>,
    cache_dir: PathBuf,
) -> Result<()> {
    let credentials = Credentials::from_env()?;
    let client = BeaClient::new(&credentials)?;
    let universe = load_universe(universe)?;
    let store = CsvStore::new(cache_dir);

    let current_year = chrono::Local::now().year();
    let first_year = start_year.unwrap_or(current_year - 4);
    let years: Vec<i32> = (first_year..=current_year).collect();
    let policy = if keep_unmapped {
        UnmappedPolicy::Keep
    } else {
        UnmappedPolicy::Drop
    };

    let table = fetch::load_or_update(&store, GDP_FILE, Frequency::Annual, force, || {
        fetch::fetch_gdp_by_sector(&client, &universe, &years, policy)
    })?;

    println!(
        "GDP by sector: {} rows ({} metrics) → {}",
        table.len(),
        table.metric_columns.len(),
        store.path(GDP_FILE).display()
    );
    Ok(())
}

fn run_etf(
    start_year: Option<i32>,
    force: bool,
    universe: Option<PathBuf>,
    cache_dir: PathBuf,
) -> Result<()> {
    let provider = YahooProvider::new()?;
    let universe = load_universe(universe)?;
    let store = CsvStore::new(cache_dir);

    let today = chrono::Local::now().date_naive();
    let first_year = start_year.unwrap_or(today.year() - 10);

    let table = fetch::load_or_update(&store, ETF_FILE, Frequency::Quarterly, force, || {
        fetch::fetch_sector_etfs(&provider, &universe, first_year, today)
    })?;

    println!(
        "Sector ETFs: {} rows across {} sectors → {}",
        table.len(),
        universe.sector_etfs.len(),
        store.path(ETF_FILE).display()
    );
    Ok(())
}

fn run_technicals(
    tickers: Vec<String>,
    start: Option<String>,
    end: Option<String>,
    cache_dir: PathBuf,
) -> Result<()> {
    let start_date = start
        .as_deref()
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()?
        .unwrap_or_else(|| chrono::Local::now().date_naive() - chrono::Duration::days(365 * 10));

    let end_date = end
        .as_deref()
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()?
        .unwrap_or_else(|| chrono::Local::now().date_naive());

    let provider = YahooProvider::new()?;
    let store = CsvStore::new(cache_dir);
    let ticker_refs: Vec<&str> = tickers.iter().map(|t| t.as_str()).collect();

    let summary = fetch::fetch_technicals(
        &provider,
        &store,
        &ticker_refs,
        start_date,
        end_date,
        &StdoutProgress,
    );

    if !summary.all_succeeded() {
        for (ticker, err) in &summary.errors {
            eprintln!("Error for {ticker}: {err}");
        }
        std::process::exit(1);
    }

    Ok(())
}

fn run_cache_status(cache_dir: &Path) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let store = CsvStore::new(cache_dir);
    let today = chrono::Local::now().date_naive();

    for (name, frequency, label) in [
        (GDP_FILE, Frequency::Annual, "annual"),
        (ETF_FILE, Frequency::Quarterly, "quarterly"),
    ] {
        let path = store.path(name);
        if !path.exists() {
            println!("{name}: not cached");
            continue;
        }
        let fresh = store.is_up_to_date_at(name, frequency, today);
        match store.load(name) {
            Ok(table) => println!(
                "{name}: {} rows, {label}, {}",
                table.len(),
                if fresh { "up to date" } else { "stale" }
            ),
            Err(_) => println!("{name}: unreadable (will be refetched)"),
        }
    }

    let technicals_dir = store.path("technicals");
    let count = std::fs::read_dir(&technicals_dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("csv"))
                .count()
        })
        .unwrap_or(0);
    println!("technicals: {count} ticker file(s)");

    Ok(())
}
