//! HTTP client for the managed object store.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use url::Url;

use crate::application::repos::{ObjectStore, RepoError};
use crate::infra::error::InfraError;

/// Header marking an uploaded object as publicly readable.
const PUBLIC_READ_HEADER: &str = "x-object-public";

/// Path-addressed blob storage reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    http: reqwest::Client,
    base: Url,
    auth_token: Option<String>,
}

impl HttpObjectStore {
    pub fn new(base_url: &str, auth_token: Option<String>) -> Result<Self, InfraError> {
        let base = Url::parse(base_url).map_err(|err| {
            InfraError::configuration(format!("invalid objstore base url `{base_url}`: {err}"))
        })?;
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            auth_token,
        })
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn upload(
        &self,
        path: &str,
        body: Bytes,
        content_type: &str,
        public: bool,
    ) -> Result<(), RepoError> {
        let mut request = self
            .authorize(self.http.put(self.object_url(path)))
            .header(
                CONTENT_TYPE,
                HeaderValue::from_str(content_type)
                    .map_err(|err| RepoError::decode(err.to_string()))?,
            )
            .body(body);
        if public {
            request = request.header(PUBLIC_READ_HEADER, "true");
        }

        request
            .send()
            .await
            .map_err(|err| RepoError::upstream(err.to_string()))?
            .error_for_status()
            .map_err(|err| RepoError::upstream(err.to_string()))?;
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Bytes, RepoError> {
        let response = self
            .authorize(self.http.get(self.object_url(path)))
            .send()
            .await
            .map_err(|err| RepoError::upstream(err.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(RepoError::NotFound);
        }
        response
            .error_for_status()
            .map_err(|err| RepoError::upstream(err.to_string()))?
            .bytes()
            .await
            .map_err(|err| RepoError::upstream(err.to_string()))
    }
}
