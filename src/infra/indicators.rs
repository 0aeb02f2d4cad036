//! Client for the economic-indicator observations API.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::application::repos::{IndicatorSource, Observation, RepoError};
use crate::infra::error::InfraError;

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    #[serde(default)]
    observations: Vec<RawObservation>,
}

#[derive(Debug, Deserialize)]
struct RawObservation {
    date: String,
    value: String,
}

#[derive(Debug, Clone)]
pub struct IndicatorClient {
    http: reqwest::Client,
    base: Url,
    api_key: String,
}

impl IndicatorClient {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, InfraError> {
        let base = Url::parse(base_url).map_err(|err| {
            InfraError::configuration(format!("invalid indicators base url `{base_url}`: {err}"))
        })?;
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl IndicatorSource for IndicatorClient {
    /// Observations come back newest first so callers can stop at the first
    /// usable value.
    async fn latest_observations(
        &self,
        series_id: &str,
        limit: u32,
    ) -> Result<Vec<Observation>, RepoError> {
        let url = format!(
            "{}/fred/series/observations",
            self.base.as_str().trim_end_matches('/')
        );
        let limit = limit.to_string();
        let response = self
            .http
            .get(&url)
            .query(&[
                ("series_id", series_id),
                ("api_key", self.api_key.as_str()),
                ("file_type", "json"),
                ("sort_order", "desc"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(|err| RepoError::upstream(err.to_string()))?
            .error_for_status()
            .map_err(|err| RepoError::upstream(err.to_string()))?;

        let body = response
            .json::<ObservationsResponse>()
            .await
            .map_err(|err| RepoError::decode(err.to_string()))?;

        Ok(body
            .observations
            .into_iter()
            .map(|raw| Observation {
                date: raw.date,
                value: raw.value,
            })
            .collect())
    }
}
