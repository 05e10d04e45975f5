//! Read access to the Google Sheet that collects the form responses.

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::upstream::{send_once, UpstreamError, UpstreamRequest};

/// Tried in order when the spreadsheet metadata lists no sheets.
pub const DEFAULT_SHEET_NAMES: &[&str] = &["설문지 응답 시트1", "시트1", "Form Responses 1", "Sheet1"];

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

pub struct SheetsClient {
    client: Client,
    api_key: String,
    base: String,
    spreadsheet_id: String,
}

impl SheetsClient {
    pub fn new(
        client: Client,
        base: &str,
        spreadsheet_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base: base.trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.into(),
        }
    }

    fn spreadsheet_url(&self) -> String {
        format!(
            "{}/v4/spreadsheets/{}",
            self.base,
            urlencoding::encode(&self.spreadsheet_id)
        )
    }

    /// Titles of all sheets, via `spreadsheets.get`.
    pub async fn sheet_names(&self) -> Result<Vec<String>, UpstreamError> {
        let request = UpstreamRequest::get(self.spreadsheet_url())
            .with_query("fields", "sheets.properties.title")
            .with_query("key", &self.api_key);
        let body = send_once(&self.client, &request).await?;
        let meta: SpreadsheetMeta =
            serde_json::from_value(body).map_err(|e| UpstreamError::Decode(e.to_string()))?;
        Ok(meta.sheets.into_iter().map(|s| s.properties.title).collect())
    }

    /// Cells of `{sheet}!A:Z` as text, via `spreadsheets.values.get`.
    pub async fn read_range(&self, sheet: &str) -> Result<Vec<Vec<String>>, UpstreamError> {
        let range = format!("{sheet}!A:Z");
        let url = format!(
            "{}/values/{}",
            self.spreadsheet_url(),
            urlencoding::encode(&range)
        );
        let request = UpstreamRequest::get(url).with_query("key", &self.api_key);
        let body = send_once(&self.client, &request).await?;
        let range: ValueRange =
            serde_json::from_value(body).map_err(|e| UpstreamError::Decode(e.to_string()))?;
        Ok(range
            .values
            .into_iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }

    /// Reads the first sheet that has any values.
    ///
    /// Sheet names come from the spreadsheet metadata, or
    /// [`DEFAULT_SHEET_NAMES`] when that lookup fails. Failing sheets are
    /// logged and skipped.
    pub async fn read_first_populated(&self) -> Option<(String, Vec<Vec<String>>)> {
        let names = match self.sheet_names().await {
            Ok(names) if !names.is_empty() => {
                info!(?names, "sheets discovered");
                names
            }
            Ok(_) => {
                warn!("spreadsheet metadata lists no sheets, trying default names");
                default_names()
            }
            Err(e) => {
                warn!("spreadsheet metadata lookup failed, trying default names: {e}");
                default_names()
            }
        };

        for name in names {
            match self.read_range(&name).await {
                Ok(values) if !values.is_empty() => {
                    info!(sheet = %name, rows = values.len(), "sheet data found");
                    return Some((name, values));
                }
                Ok(_) => debug!(sheet = %name, "sheet is empty"),
                Err(e) => warn!(sheet = %name, "reading sheet failed: {e}"),
            }
        }
        None
    }
}

fn default_names() -> Vec<String> {
    DEFAULT_SHEET_NAMES.iter().map(|s| s.to_string()).collect()
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
