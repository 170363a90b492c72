//! Price provider: daily OHLCV bars from the Yahoo v8 chart API.
//!
//! Yahoo Finance has no official API and is subject to unannounced format
//! changes; structural surprises surface as schema errors so they are
//! distinguishable from plain unavailability.

use super::error::DataError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One daily bar. Bars with no close price are dropped at the parse
/// boundary; loosely-typed non-values never reach the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Query-by-symbol-and-date-range interface over a price source.
///
/// Implementations handle provider specifics; the pipelines above only see
/// this trait, which keeps them testable against fixture providers.
pub trait PriceProvider {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Daily bars for a symbol over an inclusive date range, sorted
    /// ascending by date. Zero usable bars is a schema error.
    fn daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, DataError>;
}

// ── Yahoo chart API response ────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

// ── Provider ────────────────────────────────────────────────────────

pub struct YahooProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooProvider {
    pub const BASE_URL: &'static str = "https://query2.finance.yahoo.com/v8/finance/chart";

    pub fn new() -> Result<Self, DataError> {
        Self::with_base_url(Self::BASE_URL)
    }

    /// Base-URL override, used to point tests at a local fixture server.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::Transport(format!("build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    fn chart_url(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        // NaiveDate::and_hms_opt with in-range constants cannot fail.
        let start_ts = start.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
        let end_ts = end.and_hms_opt(23, 59, 59).unwrap().and_utc().timestamp();
        format!(
            "{}/{symbol}?period1={start_ts}&period2={end_ts}&interval=1d",
            self.base_url
        )
    }

    /// Parse the chart response into bars, dropping rows with no close.
    fn parse_response(symbol: &str, resp: ChartResponse) -> Result<Vec<PriceBar>, DataError> {
        let result = resp.chart.result.ok_or_else(|| {
            if let Some(err) = resp.chart.error {
                DataError::Schema(format!("{symbol}: {} ({})", err.description, err.code))
            } else {
                DataError::Schema(format!("{symbol}: empty result with no error"))
            }
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| DataError::Schema(format!("{symbol}: result array is empty")))?;

        let timestamps = data
            .timestamp
            .ok_or_else(|| DataError::Schema(format!("{symbol}: no timestamps")))?;

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| DataError::Schema(format!("{symbol}: no quote data")))?;

        let mut bars = Vec::with_capacity(timestamps.len());

        for (i, &ts) in timestamps.iter().enumerate() {
            let date = chrono::DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.naive_utc().date())
                .ok_or_else(|| DataError::Schema(format!("{symbol}: invalid timestamp {ts}")))?;

            // Holidays and halts come back as all-null rows; a bar without a
            // close is unusable either way.
            let Some(close) = quote.close.get(i).copied().flatten() else {
                continue;
            };

            bars.push(PriceBar {
                date,
                open: quote.open.get(i).copied().flatten().unwrap_or(close),
                high: quote.high.get(i).copied().flatten().unwrap_or(close),
                low: quote.low.get(i).copied().flatten().unwrap_or(close),
                close,
                volume: quote.volume.get(i).copied().flatten().unwrap_or(0),
            });
        }

        if bars.is_empty() {
            return Err(DataError::Schema(format!(
                "{symbol}: zero usable bars in response"
            )));
        }

        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }

    /// Execute a single fetch with bounded exponential backoff.
    fn fetch_with_retry(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, DataError> {
        let url = self.chart_url(symbol, start, end);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                std::thread::sleep(delay);
            }

            match self.client.get(&url).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS
                        || status.is_server_error()
                    {
                        last_error =
                            Some(DataError::Transport(format!("HTTP {status} for {symbol}")));
                        continue;
                    }
                    if !status.is_success() {
                        return Err(DataError::Transport(format!("HTTP {status} for {symbol}")));
                    }

                    let chart: ChartResponse = resp.json().map_err(|e| {
                        DataError::Schema(format!("{symbol}: failed to parse response: {e}"))
                    })?;

                    return Self::parse_response(symbol, chart);
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(DataError::Transport(e.to_string()));
                        continue;
                    }
                    return Err(DataError::Transport(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| DataError::Transport("max retries exceeded".into())))
    }
}

impl PriceProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, DataError> {
        self.fetch_with_retry(symbol, start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart_json(json: &str) -> ChartResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parse_drops_all_null_rows() {
        // 2024-01-02 and 2024-01-03, with a null holiday row between.
        let resp = chart_json(
            r#"{"chart": {"result": [{
                "timestamp": [1704153600, 1704240000, 1704326400],
                "indicators": {"quote": [{
                    "open":   [100.0, null, 101.0],
                    "high":   [102.0, null, 103.0],
                    "low":    [99.0,  null, 100.0],
                    "close":  [101.0, null, 102.0],
                    "volume": [1000,  null, 1100]
                }]}
            }], "error": null}}"#,
        );

        let bars = YahooProvider::parse_response("SPY", resp).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(bars[0].close, 101.0);
        assert_eq!(bars[1].close, 102.0);
    }

    #[test]
    fn parse_surfaces_provider_error_as_schema() {
        let resp = chart_json(
            r#"{"chart": {"result": null, "error": {
                "code": "Not Found",
                "description": "No data found, symbol may be delisted"
            }}}"#,
        );

        let err = YahooProvider::parse_response("XXXX", resp).unwrap_err();
        assert!(matches!(err, DataError::Schema(_)));
        assert!(err.to_string().contains("delisted"));
    }

    #[test]
    fn parse_rejects_all_null_response() {
        let resp = chart_json(
            r#"{"chart": {"result": [{
                "timestamp": [1704153600],
                "indicators": {"quote": [{
                    "open": [null], "high": [null], "low": [null],
                    "close": [null], "volume": [null]
                }]}
            }], "error": null}}"#,
        );

        assert!(matches!(
            YahooProvider::parse_response("SPY", resp),
            Err(DataError::Schema(_))
        ));
    }

    #[test]
    fn chart_url_covers_inclusive_range() {
        let provider = YahooProvider::new().unwrap();
        let url = provider.chart_url(
            "XLK",
            NaiveDate::from_ymd_opt(2015, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2015, 1, 2).unwrap(),
        );
        assert!(url.contains("/XLK?"));
        assert!(url.contains("interval=1d"));
        assert!(url.contains("period1=1420070400"));
        assert!(url.contains("period2=1420243199"));
    }
}
