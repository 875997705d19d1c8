//! Blocking client for the Google Sheets v4 values API.
//!
//! Only the three calls the intake pipeline needs are exposed: append rows,
//! overwrite one range, and read a column.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::google_auth::{GoogleAuth, GoogleAuthError};

/// Default Sheets API host.
pub const DEFAULT_SHEETS_API_BASE_URL: &str = "https://sheets.googleapis.com";

const SHEETS_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum SheetsError {
    #[error("auth error: {0}")]
    Auth(#[from] GoogleAuthError),
    #[error("http error: {0}")]
    Http(String),
    #[error("sheets api returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("json error: {0}")]
    Json(String),
}

/// Where bearer tokens come from.
#[derive(Debug, Clone)]
pub enum TokenSource {
    Google(GoogleAuth),
    Static(String),
}

impl TokenSource {
    fn bearer(&self) -> Result<String, SheetsError> {
        match self {
            TokenSource::Google(auth) => Ok(auth.get_access_token()?),
            TokenSource::Static(token) => Ok(token.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SheetsClient {
    spreadsheet_id: String,
    api_base: String,
    tokens: TokenSource,
    client: reqwest::blocking::Client,
}

/// Result of an append call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendResult {
    /// A1 range the API reports as written, e.g. `Sheet1!A5:L5`.
    pub updated_range: Option<String>,
    pub updated_rows: u32,
}

impl AppendResult {
    /// First row number of the written range, when the API reported one.
    pub fn first_row(&self) -> Option<u32> {
        self.updated_range.as_deref().and_then(first_row_of_range)
    }
}

#[derive(Debug, Serialize)]
struct ValueRangeBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    range: Option<&'a str>,
    #[serde(rename = "majorDimension")]
    major_dimension: &'static str,
    values: &'a [Vec<Value>],
}

#[derive(Debug, Deserialize)]
struct AppendResponse {
    #[serde(default)]
    updates: Option<AppendUpdates>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    updated_range: Option<String>,
    #[serde(default)]
    updated_rows: u32,
}

#[derive(Debug, Deserialize)]
struct ValueRangeResponse {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl SheetsClient {
    pub fn new(spreadsheet_id: impl Into<String>, tokens: TokenSource) -> Result<Self, SheetsError> {
        Self::with_base_url(spreadsheet_id, tokens, DEFAULT_SHEETS_API_BASE_URL)
    }

    pub fn with_base_url(
        spreadsheet_id: impl Into<String>,
        tokens: TokenSource,
        api_base: impl Into<String>,
    ) -> Result<Self, SheetsError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(SHEETS_TIMEOUT)
            .build()
            .map_err(|e| SheetsError::Http(e.to_string()))?;
        Ok(Self {
            spreadsheet_id: spreadsheet_id.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            tokens,
            client,
        })
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.api_base,
            urlencoding::encode(&self.spreadsheet_id),
            urlencoding::encode(range)
        )
    }

    /// Append rows after the last row of the table found in `range`.
    pub fn append_rows(&self, range: &str, rows: &[Vec<String>]) -> Result<AppendResult, SheetsError> {
        let values: Vec<Vec<Value>> = rows
            .iter()
            .map(|row| row.iter().cloned().map(Value::String).collect())
            .collect();
        let body = ValueRangeBody {
            range: None,
            major_dimension: "ROWS",
            values: &values,
        };
        let url = format!("{}:append", self.values_url(range));
        debug!("sheets append range={} rows={}", range, rows.len());

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.tokens.bearer()?)
            .query(&[
                ("valueInputOption", "USER_ENTERED"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&body)
            .send()
            .map_err(|e| SheetsError::Http(e.to_string()))?;

        let parsed: AppendResponse = read_json(response)?;
        let updates = parsed.updates;
        Ok(AppendResult {
            updated_range: updates.as_ref().and_then(|u| u.updated_range.clone()),
            updated_rows: updates.map(|u| u.updated_rows).unwrap_or(0),
        })
    }

    /// Overwrite `range` (usually a single cell) with `value`.
    pub fn update_value(&self, range: &str, value: Value) -> Result<(), SheetsError> {
        let values = vec![vec![value]];
        let body = ValueRangeBody {
            range: Some(range),
            major_dimension: "ROWS",
            values: &values,
        };
        debug!("sheets update range={}", range);

        let response = self
            .client
            .put(self.values_url(range))
            .bearer_auth(self.tokens.bearer()?)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&body)
            .send()
            .map_err(|e| SheetsError::Http(e.to_string()))?;

        let _: Value = read_json(response)?;
        Ok(())
    }

    /// Read the first column of `range` as display strings, one per row.
    ///
    /// Blank trailing rows are not returned by the API, so the length of the
    /// result is the last populated row of the range.
    pub fn read_column(&self, range: &str) -> Result<Vec<String>, SheetsError> {
        let response = self
            .client
            .get(self.values_url(range))
            .bearer_auth(self.tokens.bearer()?)
            .query(&[("majorDimension", "ROWS")])
            .send()
            .map_err(|e| SheetsError::Http(e.to_string()))?;

        let parsed: ValueRangeResponse = read_json(response)?;
        Ok(parsed
            .values
            .into_iter()
            .map(|row| row.into_iter().next().map(cell_text).unwrap_or_default())
            .collect())
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::blocking::Response,
) -> Result<T, SheetsError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        error!("sheets api error {}: {}", status, body);
        return Err(SheetsError::Api {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json::<T>()
        .map_err(|e| SheetsError::Json(e.to_string()))
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Row number of the first cell in an A1 range such as `Sheet1!A5:L5`.
pub fn first_row_of_range(range: &str) -> Option<u32> {
    let cells = range.rsplit_once('!').map(|(_, cells)| cells).unwrap_or(range);
    let first = cells.split(':').next()?;
    let digits: String = first.chars().skip_while(|ch| !ch.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Quote a sheet title for use in an A1 range when it needs it.
pub fn quote_sheet_name(name: &str) -> String {
    let plain = name
        .chars()
        .all(|ch| ch.is_alphanumeric() || ch == '_')
        && !name.is_empty();
    if plain {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}
