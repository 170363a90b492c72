//! Shape normalizer: raw provider records into typed tables.
//!
//! Everything here is a pure table transform. Loosely-typed provider values
//! are converted exactly once, at `normalize_records`; the rest of the
//! crate only sees `Option<f64>` metrics.

use crate::data::{BeaRecord, DataError, PriceBar};
use crate::schema::{quarter_of, PeriodKey};
use crate::table::{NormalizedRow, NormalizedTable};
use chrono::Datelike;
use std::collections::BTreeMap;

/// Coerce a provider value string to a number.
///
/// BEA formats values with thousands separators ("1,234.5") and marks
/// suppressed cells with text sentinels like "(NA)" or "(D)". Anything that
/// does not parse after comma-stripping becomes `None`: never an error,
/// never zero.
pub fn coerce_value(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Parse a BEA quarter field. BEA uses roman numerals in some datasets and
/// plain digits in others; both are accepted, as is a leading "Q".
fn parse_quarter(raw: &str) -> Option<u8> {
    match raw.trim().trim_start_matches('Q') {
        "1" | "I" => Some(1),
        "2" | "II" => Some(2),
        "3" | "III" => Some(3),
        "4" | "IV" => Some(4),
        _ => None,
    }
}

/// Normalize raw BEA records into a one-metric table keyed by
/// (period, industry code).
///
/// Value coercion is tolerant (unparseable → null metric), but the period
/// key is not: a record whose `Year` does not parse is a contract
/// violation and fails the whole table.
pub fn normalize_records(
    records: &[BeaRecord],
    metric: &str,
) -> Result<NormalizedTable, DataError> {
    let mut table = NormalizedTable::new("Industry", vec![metric.to_string()]);

    for record in records {
        let year: i32 = record.year.trim().parse().map_err(|_| {
            DataError::Schema(format!(
                "unparseable Year '{}' for industry {}",
                record.year, record.industry
            ))
        })?;

        let quarter = match record.quarter.as_deref() {
            None => None,
            Some(raw) => Some(parse_quarter(raw).ok_or_else(|| {
                DataError::Schema(format!("unparseable Quarter '{raw}' in year {year}"))
            })?),
        };

        let period = PeriodKey { year, quarter };
        table.rows.push(
            NormalizedRow::new(period, record.industry.clone())
                .with_metric(metric, coerce_value(&record.data_value)),
        );
    }

    Ok(table)
}

/// What to do with category codes absent from the code → label lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmappedPolicy {
    /// Remove rows whose code has no mapping.
    Drop,
    /// Keep rows, passing the raw code through as the category.
    Keep,
}

/// Remap industry codes to sector names via an injected lookup table.
///
/// No aggregation happens here: if the lookup maps two codes to the same
/// sector, both rows survive under that sector name. Unmapped codes are
/// handled per `policy`; nothing is dropped silently.
pub fn map_industries(
    table: &NormalizedTable,
    lookup: &BTreeMap<String, String>,
    policy: UnmappedPolicy,
) -> NormalizedTable {
    let mut mapped = NormalizedTable::new("Sector", table.metric_columns.clone());
    mapped.label_column = table.label_column.clone();

    for row in &table.rows {
        match (lookup.get(&row.category), policy) {
            (Some(sector), _) => {
                let mut out = row.clone();
                out.category = sector.clone();
                mapped.rows.push(out);
            }
            (None, UnmappedPolicy::Keep) => mapped.rows.push(row.clone()),
            (None, UnmappedPolicy::Drop) => {}
        }
    }

    mapped
}

/// Append a period-over-period fractional change of `source` as `derived`.
///
/// Computed per category group, ordered by period ascending. The first
/// period in each group has no prior value and yields null, not zero. A
/// null or zero prior value also yields null.
pub fn period_over_period(
    table: &NormalizedTable,
    source: &str,
    derived: &str,
) -> NormalizedTable {
    let mut out = table.clone();
    if !out.metric_columns.iter().any(|c| c == derived) {
        out.metric_columns.push(derived.to_string());
    }

    // Group row indices by category, ordered by period within each group.
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, row) in table.rows.iter().enumerate() {
        groups.entry(row.category.as_str()).or_default().push(i);
    }

    for indices in groups.values_mut() {
        indices.sort_by_key(|&i| table.rows[i].period);

        let mut prev: Option<f64> = None;
        for &i in indices.iter() {
            let current = table.rows[i].metric(source);
            let change = match (prev, current) {
                (Some(p), Some(c)) if p != 0.0 => Some((c - p) / p),
                _ => None,
            };
            out.rows[i].metrics.insert(derived.to_string(), change);
            prev = current;
        }
    }

    out
}

/// Collapse daily bars to one row per (year, quarter): the last close in
/// each quarter, under the given metric column.
pub fn quarterly_last_close(
    category: &str,
    label: Option<&str>,
    bars: &[PriceBar],
    metric: &str,
) -> NormalizedTable {
    let mut last_close: BTreeMap<PeriodKey, f64> = BTreeMap::new();
    let mut ordered: Vec<&PriceBar> = bars.iter().collect();
    ordered.sort_by_key(|b| b.date);

    for bar in ordered {
        let period = PeriodKey::quarterly(bar.date.year(), quarter_of(bar.date));
        last_close.insert(period, bar.close);
    }

    let mut table = NormalizedTable::new("Sector", vec![metric.to_string()]);
    table.label_column = label.map(|_| "Ticker".to_string());

    for (period, close) in last_close {
        let mut row = NormalizedRow::new(period, category).with_metric(metric, Some(close));
        row.label = label.map(str::to_string);
        table.rows.push(row);
    }

    table
}
