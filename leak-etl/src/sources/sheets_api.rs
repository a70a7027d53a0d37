use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde_json::Value;

use super::RawRecordSet;
use crate::pipeline::{PipelineError, Source};

pub const DEFAULT_SHEETS_BASE_URL: &str = "https://sheets.googleapis.com";

/// Which sheet and A1 range to read, e.g. `Form Responses 1!A1:H`.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRef {
    pub sheet_id: String,
    pub range: String,
}

/// Credentials are minted elsewhere; this source only presents them.
#[derive(Clone)]
pub enum SheetsAuth {
    BearerToken(String),
    ApiKey(String),
}

impl std::fmt::Debug for SheetsAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BearerToken(_) => f.write_str("BearerToken(..)"),
            Self::ApiKey(_) => f.write_str("ApiKey(..)"),
        }
    }
}

/// Reads the survey sheet through the Google Sheets v4 `values` endpoint.
pub struct SheetsApiSource {
    client: reqwest::Client,
    base_url: String,
    sheet: SheetRef,
    auth: SheetsAuth,
}

#[derive(serde::Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl SheetsApiSource {
    pub fn new(sheet: SheetRef, auth: SheetsAuth, timeout: Duration) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::SourceUnavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: DEFAULT_SHEETS_BASE_URL.to_string(),
            sheet,
            auth,
        })
    }

    /// Point the source at another host (a proxy or a local fake).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn values_url(&self) -> Result<Url, PipelineError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| PipelineError::SourceUnavailable(format!("invalid sheets base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| PipelineError::SourceUnavailable("sheets base url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.sheet.sheet_id.as_str(), "values", self.sheet.range.as_str()]);
        if let SheetsAuth::ApiKey(key) = &self.auth {
            url.query_pairs_mut().append_pair("key", key);
        }
        Ok(url)
    }
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Turn a `values` matrix (header row first) into a record set.
pub fn record_set_from_values(values: Vec<Vec<Value>>) -> Result<RawRecordSet, PipelineError> {
    let mut rows = values
        .into_iter()
        .map(|row| row.into_iter().map(cell_text).collect::<Vec<String>>());
    let headers = rows.next().unwrap_or_default();
    RawRecordSet::new(headers, rows.collect())
}

#[async_trait::async_trait]
impl Source for SheetsApiSource {
    async fn fetch_rows(&self) -> Result<RawRecordSet, PipelineError> {
        let url = self.values_url()?;
        let mut request = self.client.get(url);
        if let SheetsAuth::BearerToken(token) = &self.auth {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            PipelineError::SourceUnavailable(format!("request to sheets API failed: {e}"))
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PipelineError::SourceUnavailable(format!(
                "sheets API rejected the credentials ({status})"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(PipelineError::SourceUnavailable(format!(
                "sheets API returned {status}: {snippet}"
            )));
        }

        let range: ValueRange = response.json().await.map_err(|e| {
            PipelineError::SourceUnavailable(format!("unreadable sheets API response: {e}"))
        })?;

        tracing::debug!(
            sheet_id = %self.sheet.sheet_id,
            range = %self.sheet.range,
            rows = range.values.len(),
            "fetched sheet values"
        );
        record_set_from_values(range.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source(auth: SheetsAuth) -> SheetsApiSource {
        SheetsApiSource::new(
            SheetRef {
                sheet_id: "abc123".to_string(),
                range: "Form Responses 1!A1:H".to_string(),
            },
            auth,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn values_url_encodes_range_and_api_key() {
        let url = source(SheetsAuth::ApiKey("k-1".to_string())).values_url().unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123/values/Form%20Responses%201!A1:H?key=k-1"
        );

        let url = source(SheetsAuth::BearerToken("t".to_string())).values_url().unwrap();
        assert!(url.query().is_none());
    }

    #[test]
    fn values_matrix_becomes_record_set() {
        let values = serde_json::from_value::<ValueRange>(json!({
            "range": "Form Responses 1!A1:H3",
            "majorDimension": "ROWS",
            "values": [
                ["Timestamp", "City", "Methane Level", "Coordinates", "Volunteer"],
                ["7/1/2024 10:00:00", "Bangor", 5.2, "(44.80, -68.77)", "jd"],
                ["7/1/2024 11:00:00", "Bangor", "0.1"]
            ]
        }))
        .unwrap()
        .values;

        let set = record_set_from_values(values).unwrap();
        assert_eq!(set.rows.len(), 2);
        assert_eq!(set.rows[0].get("Methane Level"), Some("5.2"));
        assert_eq!(set.rows[1].get("Volunteer"), Some(""));
    }

    #[test]
    fn empty_sheet_is_a_schema_mismatch() {
        let err = record_set_from_values(vec![]).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { .. }));
    }

    #[tokio::test]
    async fn unreachable_host_is_source_unavailable() {
        let source = source(SheetsAuth::ApiKey("k".to_string())).with_base_url("http://127.0.0.1:9");
        let err = source.fetch_rows().await.unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnavailable(_)));
    }
}
