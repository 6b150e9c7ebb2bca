//! School open-data API integration for the classroom monitor.
//!
//! Provides thin lookups against the national education information
//! service:
//! - School search by name, for signup enrichment
//! - Daily timetable lookup, for pre-filling session subjects and periods

use std::fmt;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default request timeout for API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const BASE_URL: &str = "https://open.neis.go.kr/hub";
const SCHOOL_DATASET: &str = "schoolInfo";
const TIMETABLE_DATASET: &str = "elsTimetable";

/// Registry client errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The provided API key was invalid.
    #[error("invalid API key: {reason}")]
    InvalidApiKey { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// API returned an error response.
    #[error("API error {code}: {message}")]
    Api { code: String, message: String },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// A school as listed by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct School {
    /// Regional education office code.
    pub office_code: String,
    /// School code, unique within an office.
    pub code: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// One period of a school day's timetable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimetablePeriod {
    pub date: NaiveDate,
    pub period: i32,
    pub subject: String,
}

/// Registry API client.
///
/// # Thread Safety
///
/// The client is safe to clone and share across threads. Each clone shares
/// the underlying HTTP connection pool.
pub struct Client {
    http: reqwest::Client,
    api_key: String,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a new client with the given API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is empty or whitespace-only, or if
    /// the HTTP client fails to build.
    pub fn new(api_key: impl Into<String>) -> Result<Self, RegistryError> {
        let api_key = api_key.into();

        if api_key.is_empty() {
            return Err(RegistryError::InvalidApiKey {
                reason: "API key cannot be empty",
            });
        }
        if api_key.trim().is_empty() {
            return Err(RegistryError::InvalidApiKey {
                reason: "API key cannot be whitespace-only",
            });
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(RegistryError::ClientBuild)?;

        Ok(Self { http, api_key })
    }

    /// Searches schools by (partial) name.
    pub async fn search_schools(&self, name: &str) -> Result<Vec<School>, RegistryError> {
        let url = format!("{BASE_URL}/{SCHOOL_DATASET}");
        let response = self
            .http
            .get(&url)
            .query(&[
                ("KEY", self.api_key.as_str()),
                ("Type", "json"),
                ("SCHUL_NM", name),
            ])
            .send()
            .await?;
        let body = response.text().await?;
        parse_schools(&body)
    }

    /// Fetches one school day's timetable.
    pub async fn fetch_timetable(
        &self,
        office_code: &str,
        school_code: &str,
        date: NaiveDate,
    ) -> Result<Vec<TimetablePeriod>, RegistryError> {
        let url = format!("{BASE_URL}/{TIMETABLE_DATASET}");
        let day = date.format("%Y%m%d").to_string();
        let response = self
            .http
            .get(&url)
            .query(&[
                ("KEY", self.api_key.as_str()),
                ("Type", "json"),
                ("ATPT_OFCDC_SC_CODE", office_code),
                ("SD_SCHUL_CODE", school_code),
                ("ALL_TI_YMD", day.as_str()),
            ])
            .send()
            .await?;
        let body = response.text().await?;
        parse_timetable(&body)
    }
}

/// Extracts the `row` array of a dataset response.
///
/// The API wraps rows as `{"<dataset>": [{"head": [...]}, {"row": [...]}]}`
/// and reports errors as a top-level `RESULT` object instead.
fn dataset_rows(body: &str, dataset: &str) -> Result<Vec<serde_json::Value>, RegistryError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|err| RegistryError::InvalidResponse(err.to_string()))?;

    if let Some(result) = value.get("RESULT") {
        let code = result
            .get("CODE")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown");
        // INFO-200 means "no data", which is an empty result, not an error.
        if code == "INFO-200" {
            return Ok(Vec::new());
        }
        let message = result
            .get("MESSAGE")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown error");
        return Err(RegistryError::Api {
            code: code.to_string(),
            message: message.to_string(),
        });
    }

    let sections = value
        .get(dataset)
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| RegistryError::InvalidResponse(format!("missing {dataset} section")))?;
    let rows = sections
        .iter()
        .find_map(|section| section.get("row"))
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| RegistryError::InvalidResponse("missing row section".to_string()))?;
    Ok(rows.clone())
}

fn required_field<'a>(
    row: &'a serde_json::Value,
    field: &str,
) -> Result<&'a str, RegistryError> {
    row.get(field)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| RegistryError::InvalidResponse(format!("missing field {field}")))
}

fn parse_schools(body: &str) -> Result<Vec<School>, RegistryError> {
    dataset_rows(body, SCHOOL_DATASET)?
        .iter()
        .map(|row| {
            Ok(School {
                office_code: required_field(row, "ATPT_OFCDC_SC_CODE")?.to_string(),
                code: required_field(row, "SD_SCHUL_CODE")?.to_string(),
                name: required_field(row, "SCHUL_NM")?.to_string(),
                address: row
                    .get("ORG_RDNMA")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string),
            })
        })
        .collect()
}

fn parse_timetable(body: &str) -> Result<Vec<TimetablePeriod>, RegistryError> {
    dataset_rows(body, TIMETABLE_DATASET)?
        .iter()
        .map(|row| {
            let day = required_field(row, "ALL_TI_YMD")?;
            let date = NaiveDate::parse_from_str(day, "%Y%m%d")
                .map_err(|err| RegistryError::InvalidResponse(format!("bad date {day}: {err}")))?;
            let period = required_field(row, "PERIO")?;
            let period = period.parse::<i32>().map_err(|err| {
                RegistryError::InvalidResponse(format!("bad period {period}: {err}"))
            })?;
            Ok(TimetablePeriod {
                date,
                period,
                subject: required_field(row, "ITRT_CNTNT")?.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_rejects_empty_api_key() {
        assert!(matches!(
            Client::new(""),
            Err(RegistryError::InvalidApiKey { .. })
        ));
        assert!(matches!(
            Client::new("   "),
            Err(RegistryError::InvalidApiKey { .. })
        ));
        assert!(Client::new("key-123").is_ok());
    }

    #[test]
    fn debug_redacts_api_key() {
        let client = Client::new("super-secret").unwrap();
        let output = format!("{client:?}");
        assert!(!output.contains("super-secret"));
        assert!(output.contains("[REDACTED]"));
    }

    #[test]
    fn parses_school_rows() {
        let body = r#"{
            "schoolInfo": [
                {"head": [{"list_total_count": 2}, {"RESULT": {"CODE": "INFO-000"}}]},
                {"row": [
                    {"ATPT_OFCDC_SC_CODE": "J10", "SD_SCHUL_CODE": "7531100",
                     "SCHUL_NM": "Hangang Elementary", "ORG_RDNMA": "12 Riverside Rd"},
                    {"ATPT_OFCDC_SC_CODE": "B10", "SD_SCHUL_CODE": "7011569",
                     "SCHUL_NM": "Hangang Middle"}
                ]}
            ]
        }"#;

        let schools = parse_schools(body).unwrap();
        assert_eq!(schools.len(), 2);
        assert_eq!(schools[0].name, "Hangang Elementary");
        assert_eq!(schools[0].office_code, "J10");
        assert_eq!(schools[0].address.as_deref(), Some("12 Riverside Rd"));
        assert!(schools[1].address.is_none());
    }

    #[test]
    fn parses_timetable_rows() {
        let body = r#"{
            "elsTimetable": [
                {"head": [{"list_total_count": 2}]},
                {"row": [
                    {"ALL_TI_YMD": "20250310", "PERIO": "1", "ITRT_CNTNT": "Mathematics"},
                    {"ALL_TI_YMD": "20250310", "PERIO": "2", "ITRT_CNTNT": "Science"}
                ]}
            ]
        }"#;

        let periods = parse_timetable(body).unwrap();
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].period, 1);
        assert_eq!(periods[0].subject, "Mathematics");
        assert_eq!(
            periods[0].date,
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
        );
    }

    #[test]
    fn no_data_result_is_empty_not_error() {
        let body = r#"{"RESULT": {"CODE": "INFO-200", "MESSAGE": "no matching data"}}"#;
        assert!(parse_schools(body).unwrap().is_empty());
        assert!(parse_timetable(body).unwrap().is_empty());
    }

    #[test]
    fn api_errors_surface_code_and_message() {
        let body = r#"{"RESULT": {"CODE": "ERROR-290", "MESSAGE": "invalid key"}}"#;
        let err = parse_schools(body).unwrap_err();
        assert!(matches!(err, RegistryError::Api { .. }));
        assert_eq!(err.to_string(), "API error ERROR-290: invalid key");
    }

    #[test]
    fn malformed_payloads_are_invalid_responses() {
        assert!(matches!(
            parse_schools("not json"),
            Err(RegistryError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_schools(r#"{"schoolInfo": [{"head": []}]}"#),
            Err(RegistryError::InvalidResponse(_))
        ));
        let missing_field = r#"{
            "schoolInfo": [{"row": [{"SD_SCHUL_CODE": "1"}]}]
        }"#;
        assert!(matches!(
            parse_schools(missing_field),
            Err(RegistryError::InvalidResponse(_))
        ));
    }

    #[test]
    fn bad_timetable_values_are_rejected() {
        let bad_period = r#"{
            "elsTimetable": [{"row": [
                {"ALL_TI_YMD": "20250310", "PERIO": "first", "ITRT_CNTNT": "Math"}
            ]}]
        }"#;
        assert!(parse_timetable(bad_period).is_err());

        let bad_date = r#"{
            "elsTimetable": [{"row": [
                {"ALL_TI_YMD": "2025-03-10", "PERIO": "1", "ITRT_CNTNT": "Math"}
            ]}]
        }"#;
        assert!(parse_timetable(bad_date).is_err());
    }
}
