//! Fetches the single-page app's entry document from its origin.

use async_trait::async_trait;
use url::Url;

use crate::application::repos::{RepoError, SpaOrigin};
use crate::infra::error::InfraError;

#[derive(Debug, Clone)]
pub struct SpaEntryClient {
    http: reqwest::Client,
    origin: Url,
}

impl SpaEntryClient {
    pub fn new(origin: &str) -> Result<Self, InfraError> {
        let origin = Url::parse(origin).map_err(|err| {
            InfraError::configuration(format!("invalid spa origin `{origin}`: {err}"))
        })?;
        Ok(Self {
            http: reqwest::Client::new(),
            origin,
        })
    }
}

#[async_trait]
impl SpaOrigin for SpaEntryClient {
    async fn entry_document(&self) -> Result<String, RepoError> {
        self.http
            .get(self.origin.clone())
            .send()
            .await
            .map_err(|err| RepoError::upstream(err.to_string()))?
            .error_for_status()
            .map_err(|err| RepoError::upstream(err.to_string()))?
            .text()
            .await
            .map_err(|err| RepoError::upstream(err.to_string()))
    }
}
