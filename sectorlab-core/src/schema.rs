//! Canonical period schema: reporting frequencies and (year, quarter) keys.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Reporting frequency of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frequency {
    Annual,
    Quarterly,
    Daily,
}

impl Frequency {
    /// BEA query-parameter code. Daily has no BEA equivalent.
    pub fn bea_code(&self) -> Option<&'static str> {
        match self {
            Frequency::Annual => Some("A"),
            Frequency::Quarterly => Some("Q"),
            Frequency::Daily => None,
        }
    }
}

/// Key identifying a reporting period.
///
/// Quarterly rows carry `quarter` in 1..=4; annual rows leave it `None`.
/// The derived ordering is (year, quarter) lexicographic, with `None`
/// sorting before any quarter within the same year.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PeriodKey {
    pub year: i32,
    pub quarter: Option<u8>,
}

impl PeriodKey {
    pub fn annual(year: i32) -> Self {
        Self {
            year,
            quarter: None,
        }
    }

    pub fn quarterly(year: i32, quarter: u8) -> Self {
        Self {
            year,
            quarter: Some(quarter),
        }
    }
}

/// Calendar quarter containing `date`, in 1..=4.
pub fn quarter_of(date: NaiveDate) -> u8 {
    ((date.month() - 1) / 3 + 1) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarter_boundaries() {
        let d = |m, day| NaiveDate::from_ymd_opt(2023, m, day).unwrap();
        assert_eq!(quarter_of(d(1, 1)), 1);
        assert_eq!(quarter_of(d(3, 31)), 1);
        assert_eq!(quarter_of(d(4, 1)), 2);
        assert_eq!(quarter_of(d(6, 30)), 2);
        assert_eq!(quarter_of(d(7, 1)), 3);
        assert_eq!(quarter_of(d(10, 1)), 4);
        assert_eq!(quarter_of(d(12, 31)), 4);
    }

    #[test]
    fn period_ordering_is_lexicographic() {
        assert!(PeriodKey::quarterly(2023, 4) < PeriodKey::quarterly(2024, 1));
        assert!(PeriodKey::quarterly(2023, 2) < PeriodKey::quarterly(2023, 3));
        assert!(PeriodKey::annual(2023) < PeriodKey::quarterly(2023, 1));
        assert!(PeriodKey::annual(2024) > PeriodKey::quarterly(2023, 4));
    }

    #[test]
    fn bea_codes() {
        assert_eq!(Frequency::Annual.bea_code(), Some("A"));
        assert_eq!(Frequency::Quarterly.bea_code(), Some("Q"));
        assert_eq!(Frequency::Daily.bea_code(), None);
    }
}
