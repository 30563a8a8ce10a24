// Google Sheets values API, plus the two things built on it: the job tracking
// sheet (`SheetsJobStore`) and the spreadsheet side of the assistant
// (`SpreadsheetContext`).

use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Value};

use super::service_account_auth::ServiceAccountAuth;
use crate::core::assistant::{AssistantError, ContainerKind, WorkspaceContext};
use crate::core::job_alerts::{JobAlertError, JobPosting, JobStore, SHEET_HEADERS};

const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Tab holding the job tracker.
pub const JOBS_SHEET_NAME: &str = "Jobs";

type SheetsResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

#[derive(Debug, Default, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

// =============================================================================
// SHEETS CLIENT
// =============================================================================

pub struct SheetsClient {
    client: Client,
    auth: Arc<ServiceAccountAuth>,
}

impl SheetsClient {
    pub fn new(auth: Arc<ServiceAccountAuth>) -> Self {
        Self {
            client: Client::new(),
            auth,
        }
    }

    fn values_url(spreadsheet_id: &str, range: &str, action: Option<&str>) -> SheetsResult<Url> {
        let mut url = Url::parse(SHEETS_BASE_URL)?;
        let last = match action {
            Some(action) => format!("{}:{}", range, action),
            None => range.to_string(),
        };
        url.path_segments_mut()
            .map_err(|_| "Sheets base URL cannot carry a path")?
            .push(spreadsheet_id)
            .push("values")
            .push(&last);
        Ok(url)
    }

    /// Reads a range as display strings. Missing trailing cells come back
    /// shorter, not padded.
    pub async fn get_values(&self, spreadsheet_id: &str, range: &str) -> SheetsResult<Vec<Vec<String>>> {
        let token = self.auth.get_access_token().await?;
        let response = self
            .client
            .get(Self::values_url(spreadsheet_id, range, None)?)
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await?;
            return Err(format!("Sheets read of {} failed ({}): {}", range, status, text).into());
        }

        let body: ValueRange = response.json().await?;
        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    /// Appends rows after the last row of the table found in `range`.
    pub async fn append_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> SheetsResult<()> {
        let token = self.auth.get_access_token().await?;
        let response = self
            .client
            .post(Self::values_url(spreadsheet_id, range, Some("append"))?)
            .bearer_auth(token)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&json!({ "values": rows }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await?;
            return Err(format!("Sheets append to {} failed ({}): {}", range, status, text).into());
        }

        Ok(())
    }

    /// Overwrites the cells of `range`.
    pub async fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> SheetsResult<()> {
        let token = self.auth.get_access_token().await?;
        let response = self
            .client
            .put(Self::values_url(spreadsheet_id, range, None)?)
            .bearer_auth(token)
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({ "values": rows }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await?;
            return Err(format!("Sheets update of {} failed ({}): {}", range, status, text).into());
        }

        Ok(())
    }
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Quotes a tab name for A1 notation.
fn a1_range(sheet: &str, cells: &str) -> String {
    format!("'{}'!{}", sheet.replace('\'', "''"), cells)
}

// =============================================================================
// JOB TRACKING SHEET
// =============================================================================

/// Append-only job tracker in columns A:F of one tab.
pub struct SheetsJobStore {
    sheets: Arc<SheetsClient>,
    spreadsheet_id: String,
    sheet_name: String,
}

impl SheetsJobStore {
    pub fn new(sheets: Arc<SheetsClient>, spreadsheet_id: impl Into<String>) -> Self {
        Self {
            sheets,
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: JOBS_SHEET_NAME.to_string(),
        }
    }

    /// Writes the header row when the tab is still empty.
    pub async fn ensure_header(&self) -> Result<(), JobAlertError> {
        let header_range = a1_range(&self.sheet_name, "A1:F1");
        let existing = self
            .sheets
            .get_values(&self.spreadsheet_id, &header_range)
            .await
            .map_err(|e| JobAlertError::Store(e.to_string()))?;

        if existing.first().is_some_and(|row| !row.is_empty()) {
            return Ok(());
        }

        let header = SHEET_HEADERS.iter().map(|h| h.to_string()).collect();
        self.sheets
            .update_values(&self.spreadsheet_id, &header_range, vec![header])
            .await
            .map_err(|e| JobAlertError::Store(e.to_string()))?;

        tracing::info!(sheet = %self.sheet_name, "Wrote job tracker header row");
        Ok(())
    }
}

#[async_trait]
impl JobStore for SheetsJobStore {
    async fn read_url_column(&self) -> Result<Vec<String>, JobAlertError> {
        let rows = self
            .sheets
            .get_values(&self.spreadsheet_id, &a1_range(&self.sheet_name, "E:E"))
            .await
            .map_err(|e| JobAlertError::Store(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| row.into_iter().next().unwrap_or_default())
            .collect())
    }

    async fn append_rows(&self, postings: &[JobPosting]) -> Result<(), JobAlertError> {
        let rows = postings.iter().map(JobPosting::to_row).collect();
        self.sheets
            .append_values(&self.spreadsheet_id, &a1_range(&self.sheet_name, "A:F"), rows)
            .await
            .map_err(|e| JobAlertError::Store(e.to_string()))
    }
}

// =============================================================================
// SPREADSHEET CONTEXT
// =============================================================================

/// A spreadsheet range as seen by the assistant.
pub struct SpreadsheetContext {
    sheets: Arc<SheetsClient>,
    spreadsheet_id: String,
    /// A1 range that is read as context, e.g. `Sheet1!A1:Z200`.
    range: String,
    /// Cell that plays the role of the cursor, e.g. `Sheet1!H2`.
    active_cell: Option<String>,
}

impl SpreadsheetContext {
    pub fn new(
        sheets: Arc<SheetsClient>,
        spreadsheet_id: impl Into<String>,
        range: impl Into<String>,
        active_cell: Option<String>,
    ) -> Self {
        Self {
            sheets,
            spreadsheet_id: spreadsheet_id.into(),
            range: range.into(),
            active_cell,
        }
    }
}

#[async_trait]
impl WorkspaceContext for SpreadsheetContext {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Spreadsheet
    }

    async fn content(&self) -> Result<String, AssistantError> {
        let rows = self
            .sheets
            .get_values(&self.spreadsheet_id, &self.range)
            .await
            .map_err(|e| AssistantError::Workspace(e.to_string()))?;
        Ok(render_rows(&rows))
    }

    async fn insert_at_cursor(&self, text: &str) -> Result<(), AssistantError> {
        let result = match &self.active_cell {
            Some(cell) => {
                self.sheets
                    .update_values(&self.spreadsheet_id, cell, vec![vec![text.to_string()]])
                    .await
            }
            None => {
                self.sheets
                    .append_values(&self.spreadsheet_id, &self.range, vec![vec![text.to_string()]])
                    .await
            }
        };
        result.map_err(|e| AssistantError::Workspace(e.to_string()))
    }
}

/// Tab-separated cells, one line per row.
fn render_rows(rows: &[Vec<String>]) -> String {
    rows.iter()
        .map(|row| row.join("\t"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_url_encodes_range() {
        let url = SheetsClient::values_url("abc123", "'My Jobs'!E:E", None).unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123/values/'My%20Jobs'!E:E"
        );

        let append = SheetsClient::values_url("abc123", "'Jobs'!A:F", Some("append")).unwrap();
        assert!(append.as_str().ends_with("/values/'Jobs'!A:F:append"));
    }

    #[test]
    fn test_a1_range_escapes_quotes() {
        assert_eq!(a1_range("Jobs", "E:E"), "'Jobs'!E:E");
        assert_eq!(a1_range("Bob's", "A1"), "'Bob''s'!A1");
    }

    #[test]
    fn test_value_range_cells_become_text() {
        let body: ValueRange = serde_json::from_value(json!({
            "range": "Jobs!E1:E3",
            "values": [["URL"], [], [42]]
        }))
        .unwrap();

        let rows: Vec<Vec<String>> = body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect();
        assert_eq!(rows, vec![vec!["URL".to_string()], vec![], vec!["42".to_string()]]);
    }

    #[test]
    fn test_render_rows_uses_tabs_and_newlines() {
        let rows = vec![
            vec!["Name".to_string(), "Score".to_string()],
            vec!["Ada".to_string(), "10".to_string()],
        ];
        assert_eq!(render_rows(&rows), "Name\tScore\nAda\t10");
    }
}
