//! BEA (Bureau of Economic Analysis) statistics client.
//!
//! Fetches tables from the BEA data API by HTTP GET with query parameters.
//! The response envelope is `BEAAPI.Results.Data`: a JSON array of flat
//! records in which every field, including numeric values, is typed as a
//! string. BEA also reports request errors inside a 200 body as
//! `BEAAPI.Results.Error`; both cases surface as schema errors.

use super::error::DataError;
use crate::config::Credentials;
use crate::schema::Frequency;
use serde::Deserialize;
use std::time::Duration;

/// Immutable per-call query parameters for the statistics provider.
#[derive(Debug, Clone)]
pub struct DatasetRequest {
    /// Dataset name, e.g. "GDPbyIndustry".
    pub dataset: String,
    /// Table id within the dataset, e.g. "1" (value added).
    pub table_id: String,
    /// Industry filter; "ALL" for every industry.
    pub industry: String,
    /// Years to request; empty means all available years.
    pub years: Vec<i32>,
    pub frequency: Frequency,
}

impl DatasetRequest {
    /// Annual GDP-by-industry request for all industries.
    pub fn gdp_by_industry(table_id: impl Into<String>, years: Vec<i32>) -> Self {
        Self {
            dataset: "GDPbyIndustry".to_string(),
            table_id: table_id.into(),
            industry: "ALL".to_string(),
            years,
            frequency: Frequency::Annual,
        }
    }

    fn year_param(&self) -> String {
        if self.years.is_empty() {
            "ALL".to_string()
        } else {
            self.years
                .iter()
                .map(|y| y.to_string())
                .collect::<Vec<_>>()
                .join(",")
        }
    }
}

// ── Response envelope ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct BeaEnvelope {
    #[serde(rename = "BEAAPI")]
    beaapi: BeaApi,
}

#[derive(Debug, Deserialize)]
struct BeaApi {
    #[serde(rename = "Results")]
    results: Option<BeaResults>,
}

#[derive(Debug, Deserialize)]
struct BeaResults {
    #[serde(rename = "Data")]
    data: Option<Vec<BeaRecord>>,
    #[serde(rename = "Error")]
    error: Option<BeaApiError>,
}

#[derive(Debug, Deserialize)]
struct BeaApiError {
    #[serde(rename = "APIErrorCode")]
    code: Option<String>,
    #[serde(rename = "APIErrorDescription")]
    description: Option<String>,
}

/// One flat record from `BEAAPI.Results.Data`, still string-typed.
///
/// `IndustrYDescription` is BEA's own spelling.
#[derive(Debug, Clone, Deserialize)]
pub struct BeaRecord {
    #[serde(rename = "Year")]
    pub year: String,
    #[serde(rename = "Quarter", default)]
    pub quarter: Option<String>,
    #[serde(rename = "Industry")]
    pub industry: String,
    #[serde(rename = "IndustrYDescription", default)]
    pub industry_description: Option<String>,
    #[serde(rename = "DataValue", default)]
    pub data_value: String,
}

/// Trait over the statistics provider, so pipelines can run against
/// fixtures in tests. `BeaClient` is the production implementation.
pub trait StatsProvider {
    /// Raw records for one table; zero rows is a schema error.
    fn table_records(&self, request: &DatasetRequest) -> Result<Vec<BeaRecord>, DataError>;
}

// ── Client ──────────────────────────────────────────────────────────

pub struct BeaClient {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    max_retries: u32,
    base_delay: Duration,
}

impl BeaClient {
    pub const BASE_URL: &'static str = "https://apps.bea.gov/api/data";

    pub fn new(credentials: &Credentials) -> Result<Self, DataError> {
        Self::with_base_url(credentials, Self::BASE_URL)
    }

    /// Base-URL override, used to point tests at a local fixture server.
    pub fn with_base_url(
        credentials: &Credentials,
        base_url: impl Into<String>,
    ) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DataError::Transport(format!("build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: credentials.bea_api_key.clone(),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    /// Fetch one table as raw string-typed records.
    ///
    /// Zero rows for the requested table is a schema error; the caller
    /// never sees an empty record set.
    pub fn get_data(&self, request: &DatasetRequest) -> Result<Vec<BeaRecord>, DataError> {
        let frequency = request.frequency.bea_code().ok_or_else(|| {
            DataError::Schema(format!(
                "BEA has no {:?} frequency; use Annual or Quarterly",
                request.frequency
            ))
        })?;

        let years = request.year_param();
        let params = [
            ("UserID", self.api_key.as_str()),
            ("method", "GetData"),
            ("datasetname", request.dataset.as_str()),
            ("TableID", request.table_id.as_str()),
            ("Industry", request.industry.as_str()),
            ("Year", years.as_str()),
            ("Frequency", frequency),
            ("ResultFormat", "JSON"),
        ];

        let envelope = self.get_with_retry(&params)?;
        parse_envelope(envelope, &request.table_id)
    }

    /// Execute the GET with bounded exponential backoff.
    ///
    /// Rate limiting and server errors retry; other client errors fail
    /// immediately.
    fn get_with_retry(&self, params: &[(&str, &str)]) -> Result<BeaEnvelope, DataError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                std::thread::sleep(delay);
            }

            match self.client.get(&self.base_url).query(params).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS
                        || status.is_server_error()
                    {
                        last_error = Some(DataError::Transport(format!("HTTP {status} from BEA")));
                        continue;
                    }
                    if !status.is_success() {
                        return Err(DataError::Transport(format!("HTTP {status} from BEA")));
                    }

                    return resp
                        .json::<BeaEnvelope>()
                        .map_err(|e| DataError::Schema(format!("malformed BEA response: {e}")));
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

impl StatsProvider for BeaClient {
    fn table_records(&self, request: &DatasetRequest) -> Result<Vec<BeaRecord>, DataError> {
        self.get_data(request)
    }
}

/// Pull the record array out of the envelope, or explain what was missing.
fn parse_envelope(envelope: BeaEnvelope, table_id: &str) -> Result<Vec<BeaRecord>, DataError> {
    let results = envelope
        .beaapi
        .results
        .ok_or_else(|| DataError::Schema("BEA response has no Results".into()))?;

    if let Some(err) = results.error {
        return Err(DataError::Schema(format!(
            "BEA error {}: {}",
            err.code.as_deref().unwrap_or("?"),
            err.description.as_deref().unwrap_or("no description")
        )));
    }

    let data = results
        .data
        .ok_or_else(|| DataError::Schema("BEA Results has no Data array".into()))?;

    if data.is_empty() {
        return Err(DataError::Schema(format!(
            "BEA table {table_id} returned zero rows"
        )));
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(json: &str) -> BeaEnvelope {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parse_well_formed_envelope() {
        let env = envelope(
            r#"{"BEAAPI": {"Results": {"Data": [
                {"Year": "2020", "Industry": "31G", "IndustrYDescription": "Manufacturing", "DataValue": "123"},
                {"Year": "2021", "Industry": "52", "DataValue": "456"}
            ]}}}"#,
        );

        let records = parse_envelope(env, "1").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].year, "2020");
        assert_eq!(records[0].industry, "31G");
        assert_eq!(
            records[0].industry_description.as_deref(),
            Some("Manufacturing")
        );
        assert_eq!(records[1].data_value, "456");
        assert!(records[1].quarter.is_none());
    }

    #[test]
    fn missing_results_is_schema_error() {
        let env = envelope(r#"{"BEAAPI": {}}"#);
        assert!(matches!(
            parse_envelope(env, "1"),
            Err(DataError::Schema(_))
        ));
    }

    #[test]
    fn missing_data_array_is_schema_error() {
        let env = envelope(r#"{"BEAAPI": {"Results": {}}}"#);
        assert!(matches!(
            parse_envelope(env, "1"),
            Err(DataError::Schema(_))
        ));
    }

    #[test]
    fn zero_rows_is_schema_error() {
        let env = envelope(r#"{"BEAAPI": {"Results": {"Data": []}}}"#);
        let err = parse_envelope(env, "15").unwrap_err();
        assert!(err.to_string().contains("table 15"));
    }

    #[test]
    fn in_body_error_is_schema_error() {
        let env = envelope(
            r#"{"BEAAPI": {"Results": {"Error": {
                "APIErrorCode": "3",
                "APIErrorDescription": "Invalid UserID"
            }}}}"#,
        );
        let err = parse_envelope(env, "1").unwrap_err();
        assert!(err.to_string().contains("Invalid UserID"));
    }

    #[test]
    fn year_param_joins_or_defaults_to_all() {
        let req = DatasetRequest::gdp_by_industry("1", vec![2020, 2021, 2022]);
        assert_eq!(req.year_param(), "2020,2021,2022");

        let all = DatasetRequest::gdp_by_industry("1", vec![]);
        assert_eq!(all.year_param(), "ALL");
    }

    #[test]
    fn client_requires_annual_or_quarterly() {
        let creds = Credentials::new("TEST_KEY").unwrap();
        let client = BeaClient::new(&creds).unwrap();

        let mut req = DatasetRequest::gdp_by_industry("1", vec![2020]);
        req.frequency = Frequency::Daily;
        assert!(matches!(
            client.get_data(&req),
            Err(DataError::Schema(_))
        ));
    }
}
