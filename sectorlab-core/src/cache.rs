//! CSV persistence and cache freshness.
//!
//! Layout: flat CSV files under a cache root, one table per file, fully
//! overwritten on refresh (never appended). Column order is fixed:
//! `Year[,Quarter],<category>[,Ticker],<metrics...>`; the one recognized
//! non-metric text column besides the category is `Ticker`.
//!
//! Writes are atomic (write to .tmp, rename into place) so the freshness
//! check never observes a partial file. Read failures are deliberately
//! soft: an absent, empty, or corrupt file is simply stale, which triggers
//! a refetch. The cache is fully regenerable from the remote source.

use crate::data::{DataError, PriceBar};
use crate::schema::Frequency;
use crate::table::{NormalizedRow, NormalizedTable};
use chrono::{Datelike, NaiveDate};
use std::fs;
use std::path::{Path, PathBuf};

/// Text columns (besides the category) recognized when loading a table.
const LABEL_COLUMNS: &[&str] = &["Ticker"];

/// CSV-backed table store rooted at a cache directory.
pub struct CsvStore {
    root: PathBuf,
}

impl CsvStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a named cache file.
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    // ── Tables ──────────────────────────────────────────────────────

    /// Write a table, creating parent directories as needed.
    ///
    /// The `Quarter` column is present iff any row carries a quarter.
    pub fn save(&self, name: &str, table: &NormalizedTable) -> Result<(), DataError> {
        if table.is_empty() {
            return Err(DataError::Cache(format!("no rows to write to {name}")));
        }

        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| DataError::Cache(format!("create {}: {e}", parent.display())))?;
        }

        let with_quarter = table.has_quarters();
        let tmp_path = path.with_extension("csv.tmp");

        let mut writer = csv::Writer::from_path(&tmp_path)
            .map_err(|e| DataError::Cache(format!("create {}: {e}", tmp_path.display())))?;

        let mut header: Vec<&str> = vec!["Year"];
        if with_quarter {
            header.push("Quarter");
        }
        header.push(&table.category_column);
        if let Some(label) = &table.label_column {
            header.push(label);
        }
        for col in &table.metric_columns {
            header.push(col);
        }
        writer
            .write_record(&header)
            .map_err(|e| DataError::Cache(format!("write header: {e}")))?;

        for row in &table.rows {
            let mut record: Vec<String> = vec![row.period.year.to_string()];
            if with_quarter {
                record.push(
                    row.period
                        .quarter
                        .map(|q| q.to_string())
                        .unwrap_or_default(),
                );
            }
            record.push(row.category.clone());
            if table.label_column.is_some() {
                record.push(row.label.clone().unwrap_or_default());
            }
            for col in &table.metric_columns {
                record.push(match row.metric(col) {
                    Some(v) => v.to_string(),
                    None => String::new(),
                });
            }
            writer
                .write_record(&record)
                .map_err(|e| DataError::Cache(format!("write row: {e}")))?;
        }

        writer
            .flush()
            .map_err(|e| DataError::Cache(format!("flush {}: {e}", tmp_path.display())))?;
        drop(writer);

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::Cache(format!("atomic rename to {}: {e}", path.display()))
        })
    }

    /// Load a table back; the exact inverse of `save` for every column
    /// present at save time.
    pub fn load(&self, name: &str) -> Result<NormalizedTable, DataError> {
        let path = self.path(name);
        let mut reader = csv::Reader::from_path(&path)
            .map_err(|e| DataError::Cache(format!("open {}: {e}", path.display())))?;

        let headers = reader
            .headers()
            .map_err(|e| DataError::Cache(format!("read header: {e}")))?
            .clone();

        let mut year_idx = None;
        let mut quarter_idx = None;
        let mut label: Option<(usize, String)> = None;
        let mut category: Option<(usize, String)> = None;
        let mut metrics: Vec<(usize, String)> = Vec::new();

        for (i, col) in headers.iter().enumerate() {
            match col {
                "Year" => year_idx = Some(i),
                "Quarter" => quarter_idx = Some(i),
                _ if LABEL_COLUMNS.contains(&col) && label.is_none() => {
                    label = Some((i, col.to_string()));
                }
                _ if category.is_none() => category = Some((i, col.to_string())),
                _ => metrics.push((i, col.to_string())),
            }
        }

        let year_idx =
            year_idx.ok_or_else(|| DataError::Cache(format!("{name}: missing Year column")))?;
        let (category_idx, category_column) = category
            .ok_or_else(|| DataError::Cache(format!("{name}: missing category column")))?;

        let mut table = NormalizedTable::new(
            category_column,
            metrics.iter().map(|(_, c)| c.clone()).collect(),
        );
        table.label_column = label.as_ref().map(|(_, c)| c.clone());

        for result in reader.records() {
            let record =
                result.map_err(|e| DataError::Cache(format!("{name}: read row: {e}")))?;

            let field = |i: usize| record.get(i).unwrap_or("").trim();

            let year: i32 = field(year_idx)
                .parse()
                .map_err(|_| {
                    DataError::Cache(format!("{name}: unparseable Year '{}'", field(year_idx)))
                })?;

            let quarter = match quarter_idx.map(field) {
                None | Some("") => None,
                Some(raw) => Some(raw.parse::<u8>().map_err(|_| {
                    DataError::Cache(format!("{name}: unparseable Quarter '{raw}'"))
                })?),
            };

            let mut row = NormalizedRow::new(
                crate::schema::PeriodKey { year, quarter },
                field(category_idx),
            );
            if let Some((label_idx, _)) = &label {
                let value = field(*label_idx);
                if !value.is_empty() {
                    row.label = Some(value.to_string());
                }
            }
            for (idx, col) in &metrics {
                let raw = field(*idx);
                let value = if raw.is_empty() {
                    None
                } else {
                    Some(raw.parse::<f64>().map_err(|_| {
                        DataError::Cache(format!("{name}: unparseable value '{raw}' in {col}"))
                    })?)
                };
                row.metrics.insert(col.clone(), value);
            }
            table.rows.push(row);
        }

        Ok(table)
    }

    // ── Daily bars ──────────────────────────────────────────────────

    /// Write daily OHLCV bars as `Date,Open,High,Low,Close,Volume`.
    pub fn save_bars(&self, name: &str, bars: &[PriceBar]) -> Result<(), DataError> {
        if bars.is_empty() {
            return Err(DataError::Cache(format!("no bars to write to {name}")));
        }

        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| DataError::Cache(format!("create {}: {e}", parent.display())))?;
        }

        let tmp_path = path.with_extension("csv.tmp");
        let mut writer = csv::Writer::from_path(&tmp_path)
            .map_err(|e| DataError::Cache(format!("create {}: {e}", tmp_path.display())))?;

        writer
            .write_record(["Date", "Open", "High", "Low", "Close", "Volume"])
            .map_err(|e| DataError::Cache(format!("write header: {e}")))?;

        for bar in bars {
            writer
                .write_record([
                    bar.date.format("%Y-%m-%d").to_string(),
                    bar.open.to_string(),
                    bar.high.to_string(),
                    bar.low.to_string(),
                    bar.close.to_string(),
                    bar.volume.to_string(),
                ])
                .map_err(|e| DataError::Cache(format!("write row: {e}")))?;
        }

        writer
            .flush()
            .map_err(|e| DataError::Cache(format!("flush {}: {e}", tmp_path.display())))?;
        drop(writer);

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::Cache(format!("atomic rename to {}: {e}", path.display()))
        })
    }

    /// Load daily bars back, sorted ascending by date.
    pub fn load_bars(&self, name: &str) -> Result<Vec<PriceBar>, DataError> {
        let path = self.path(name);
        let mut reader = csv::Reader::from_path(&path)
            .map_err(|e| DataError::Cache(format!("open {}: {e}", path.display())))?;

        let mut bars = Vec::new();
        for result in reader.records() {
            let record =
                result.map_err(|e| DataError::Cache(format!("{name}: read row: {e}")))?;
            let field = |i: usize| record.get(i).unwrap_or("").trim().to_string();
            let num = |i: usize| -> Result<f64, DataError> {
                field(i)
                    .parse()
                    .map_err(|_| DataError::Cache(format!("{name}: unparseable '{}'", field(i))))
            };

            bars.push(PriceBar {
                date: NaiveDate::parse_from_str(&field(0), "%Y-%m-%d").map_err(|_| {
                    DataError::Cache(format!("{name}: unparseable Date '{}'", field(0)))
                })?,
                open: num(1)?,
                high: num(2)?,
                low: num(3)?,
                close: num(4)?,
                volume: field(5)
                    .parse()
                    .map_err(|_| DataError::Cache(format!("{name}: unparseable Volume")))?,
            });
        }

        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }

    // ── Freshness ───────────────────────────────────────────────────

    /// Whether the named cache file already covers the most recently
    /// completed period for its frequency. Pure read, no side effects.
    pub fn is_up_to_date(&self, name: &str, frequency: Frequency) -> bool {
        self.is_up_to_date_at(name, frequency, chrono::Local::now().date_naive())
    }

    /// Freshness against an explicit calendar date.
    ///
    /// Fails closed: an absent, unreadable, empty, or column-deficient file
    /// is stale. A max year beyond `today`'s year counts as fresh
    /// regardless of quarter; forward-dated data is tolerated rather than
    /// flagged.
    pub fn is_up_to_date_at(&self, name: &str, frequency: Frequency, today: NaiveDate) -> bool {
        let table = match self.load(name) {
            Ok(t) => t,
            Err(_) => return false,
        };

        let Some(latest_year) = table.rows.iter().map(|r| r.period.year).max() else {
            return false;
        };

        match frequency {
            Frequency::Annual => latest_year >= today.year(),
            Frequency::Quarterly => {
                let latest_quarter = table
                    .rows
                    .iter()
                    .filter(|r| r.period.year == latest_year)
                    .filter_map(|r| r.period.quarter)
                    .max();
                let current_quarter = crate::schema::quarter_of(today);

                latest_year > today.year()
                    || (latest_year == today.year()
                        && latest_quarter.is_some_and(|q| q >= current_quarter))
            }
            // Daily technicals are refetched unconditionally.
            Frequency::Daily => false,
        }
    }
}
