//! Read-only client for the external spreadsheet's values API.
//!
//! Authenticates with a non-interactive service credential and reads
//! rectangular or single-cell ranges. Cells come back as loosely typed JSON
//! values; everything is normalized to text and parsed downstream.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::application::repos::{RepoError, SpreadsheetSource};
use crate::infra::error::InfraError;

#[derive(Debug, Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Clone)]
pub struct SheetsClient {
    http: reqwest::Client,
    base: Url,
    spreadsheet_id: String,
    auth_token: String,
}

impl SheetsClient {
    pub fn new(
        base_url: &str,
        spreadsheet_id: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Result<Self, InfraError> {
        let base = Url::parse(base_url).map_err(|err| {
            InfraError::configuration(format!("invalid sheets base url `{base_url}`: {err}"))
        })?;
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            spreadsheet_id: spreadsheet_id.into(),
            auth_token: auth_token.into(),
        })
    }

    async fn fetch_values(&self, range: &str) -> Result<Vec<Vec<String>>, RepoError> {
        let url = format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.base.as_str().trim_end_matches('/'),
            self.spreadsheet_id,
            range
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.auth_token)
            .query(&[("majorDimension", "ROWS")])
            .send()
            .await
            .map_err(|err| RepoError::upstream(err.to_string()))?
            .error_for_status()
            .map_err(|err| RepoError::upstream(err.to_string()))?;

        let body = response
            .json::<ValuesResponse>()
            .await
            .map_err(|err| RepoError::decode(err.to_string()))?;

        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_text).collect())
            .collect())
    }
}

fn cell_to_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SpreadsheetSource for SheetsClient {
    async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>, RepoError> {
        self.fetch_values(range).await
    }

    async fn read_cell(&self, range: &str) -> Result<Option<String>, RepoError> {
        let rows = self.fetch_values(range).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .filter(|cell| !cell.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::cell_to_text;

    #[test]
    fn cells_normalize_to_text() {
        assert_eq!(cell_to_text(serde_json::json!("1,300")), "1,300");
        assert_eq!(cell_to_text(serde_json::json!(42.5)), "42.5");
        assert_eq!(cell_to_text(serde_json::Value::Null), "");
    }
}
