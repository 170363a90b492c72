//! Normalized tabular data: rows keyed by (period, category) with named
//! numeric metric columns.
//!
//! Metric tables coming out of the fetchers are combined by outer join on
//! the (period, category) key, so a category missing one metric still
//! appears with a null for that metric.

use crate::schema::PeriodKey;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One normalized row: a period, a category, and named numeric metrics.
///
/// Metric values are `Option<f64>`: a missing or unparseable provider
/// value is `None`, never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub period: PeriodKey,
    pub category: String,
    /// Secondary text label (e.g. the ETF ticker behind a sector). Not part
    /// of the join key.
    pub label: Option<String>,
    pub metrics: BTreeMap<String, Option<f64>>,
}

impl NormalizedRow {
    pub fn new(period: PeriodKey, category: impl Into<String>) -> Self {
        Self {
            period,
            category: category.into(),
            label: None,
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: Option<f64>) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Metric value by column name; `None` when the column is absent or null.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied().flatten()
    }
}

/// A table of normalized rows with a stable column layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTable {
    /// Header name of the category column (e.g. "Industry", "Sector").
    pub category_column: String,
    /// Header name of the label column, when rows carry one (e.g. "Ticker").
    pub label_column: Option<String>,
    /// Metric columns in header order.
    pub metric_columns: Vec<String>,
    pub rows: Vec<NormalizedRow>,
}

impl NormalizedTable {
    pub fn new(category_column: impl Into<String>, metric_columns: Vec<String>) -> Self {
        Self {
            category_column: category_column.into(),
            label_column: None,
            metric_columns,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether any row carries a quarter.
    pub fn has_quarters(&self) -> bool {
        self.rows.iter().any(|r| r.period.quarter.is_some())
    }

    /// Maximum (year, quarter) key across all rows. `None` when empty.
    pub fn max_period(&self) -> Option<PeriodKey> {
        self.rows.iter().map(|r| r.period).max()
    }

    /// Sort rows by (category, period) ascending, the canonical row order
    /// for persisted tables.
    pub fn sort(&mut self) {
        self.rows
            .sort_by(|a, b| (a.category.as_str(), a.period).cmp(&(b.category.as_str(), b.period)));
    }

    /// Outer join with `other` on the (period, category) key.
    ///
    /// Metric columns of `other` that are not already present are appended.
    /// Rows present on only one side keep `None` for the other side's
    /// metrics. Where both sides carry the same column, the left value wins
    /// unless it is null. The result keeps the left table's category and
    /// label column names.
    pub fn outer_join(&self, other: &NormalizedTable) -> NormalizedTable {
        let mut columns = self.metric_columns.clone();
        for col in &other.metric_columns {
            if !columns.contains(col) {
                columns.push(col.clone());
            }
        }

        let index =
            |t: &'_ NormalizedTable| -> BTreeMap<(PeriodKey, String), usize> {
                t.rows
                    .iter()
                    .enumerate()
                    .map(|(i, r)| ((r.period, r.category.clone()), i))
                    .collect()
            };
        let left = index(self);
        let right = index(other);

        let mut keys: BTreeSet<(PeriodKey, String)> = left.keys().cloned().collect();
        keys.extend(right.keys().cloned());

        let mut joined = NormalizedTable::new(self.category_column.clone(), columns.clone());
        joined.label_column = self.label_column.clone().or_else(|| other.label_column.clone());

        for (period, category) in keys {
            let key = (period, category.clone());
            let l = left.get(&key).map(|&i| &self.rows[i]);
            let r = right.get(&key).map(|&i| &other.rows[i]);

            let mut row = NormalizedRow::new(period, category);
            row.label = l
                .and_then(|row| row.label.clone())
                .or_else(|| r.and_then(|row| row.label.clone()));
            for col in &columns {
                let value = l
                    .and_then(|row| row.metric(col))
                    .or_else(|| r.and_then(|row| row.metric(col)));
                row.metrics.insert(col.clone(), value);
            }
            joined.rows.push(row);
        }

        joined
    }
}
