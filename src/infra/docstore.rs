//! REST client for the managed document store, plus the repository
//! implementations built on top of it.
//!
//! The store exposes collection/document addressing, JSON fields and an
//! atomic commit endpoint accepting a list of set/merge/delete writes. Its
//! internals are opaque; everything here is plain HTTP.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::application::repos::{PortfolioBatch, PortfolioRepo, PostsRepo, RepoError};
use crate::domain::posts::{PostContentRecord, PostMetaRecord};
use crate::infra::error::InfraError;

const FX_DOCUMENT_ID: &str = "fx";
const RATES_DOCUMENT_ID: &str = "rates";
const HOLDINGS_SUBCOLLECTION: &str = "holdings";

/// One stored document: generated id plus schema-flexible fields.
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Value,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    documents: Vec<Document>,
}

/// One write inside an atomic commit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WriteOp {
    Set {
        collection: String,
        id: String,
        fields: Value,
        /// Field-level merge instead of full replacement.
        merge: bool,
    },
    Delete {
        collection: String,
        id: String,
    },
}

/// Thin HTTP client over the document-store REST surface.
#[derive(Debug, Clone)]
pub struct DocStoreClient {
    http: reqwest::Client,
    base: Url,
    auth_token: Option<String>,
}

impl DocStoreClient {
    pub fn new(base_url: &str, auth_token: Option<String>) -> Result<Self, InfraError> {
        let base = Url::parse(base_url).map_err(|err| {
            InfraError::configuration(format!("invalid docstore base url `{base_url}`: {err}"))
        })?;
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            auth_token,
        })
    }

    fn endpoint(&self, suffix: &str) -> String {
        format!("{}/v1/{}", self.base.as_str().trim_end_matches('/'), suffix)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    pub async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, RepoError> {
        let url = self.endpoint(&format!("documents/{collection}/{id}"));
        let response = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .map_err(|err| RepoError::upstream(err.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .map_err(|err| RepoError::upstream(err.to_string()))?;
        let document = response
            .json::<Document>()
            .await
            .map_err(|err| RepoError::decode(err.to_string()))?;
        Ok(Some(document))
    }

    pub async fn list_documents(&self, collection: &str) -> Result<Vec<Document>, RepoError> {
        let url = self.endpoint(&format!("documents/{collection}"));
        let response = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .map_err(|err| RepoError::upstream(err.to_string()))?
            .error_for_status()
            .map_err(|err| RepoError::upstream(err.to_string()))?;
        let list = response
            .json::<ListResponse>()
            .await
            .map_err(|err| RepoError::decode(err.to_string()))?;
        Ok(list.documents)
    }

    /// Apply all writes as one unit; the store rejects or applies them
    /// together.
    pub async fn commit(&self, writes: &[WriteOp]) -> Result<(), RepoError> {
        let url = self.endpoint("documents:commit");
        self.authorize(self.http.post(&url))
            .json(&serde_json::json!({ "writes": writes }))
            .send()
            .await
            .map_err(|err| RepoError::upstream(err.to_string()))?
            .error_for_status()
            .map_err(|err| RepoError::upstream(err.to_string()))?;
        Ok(())
    }
}

/// Collection names the blog deployment uses.
#[derive(Debug, Clone)]
pub struct DocStoreCollections {
    pub posts: String,
    pub content: String,
    pub market: String,
    pub users: String,
}

/// Document-store-backed implementation of the repository traits.
#[derive(Clone)]
pub struct DocStoreRepositories {
    client: DocStoreClient,
    collections: DocStoreCollections,
}

impl DocStoreRepositories {
    pub fn new(client: DocStoreClient, collections: DocStoreCollections) -> Self {
        Self {
            client,
            collections,
        }
    }

    fn holdings_collection(&self, owner: &str) -> String {
        format!(
            "{}/{}/{}",
            self.collections.users, owner, HOLDINGS_SUBCOLLECTION
        )
    }
}

fn decode_fields<T>(document: Document) -> Result<T, RepoError>
where
    T: serde::de::DeserializeOwned + WithId,
{
    let id = document.id;
    let mut record: T = serde_json::from_value(document.fields)
        .map_err(|err| RepoError::decode(format!("document `{id}`: {err}")))?;
    record.set_id(id);
    Ok(record)
}

/// Records carry the document id alongside the stored fields.
trait WithId {
    fn set_id(&mut self, id: String);
}

impl WithId for PostMetaRecord {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl WithId for PostContentRecord {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

#[async_trait]
impl PostsRepo for DocStoreRepositories {
    async fn list_post_meta(&self) -> Result<Vec<PostMetaRecord>, RepoError> {
        let documents = self.client.list_documents(&self.collections.posts).await?;
        documents.into_iter().map(decode_fields).collect()
    }

    async fn get_post_meta(&self, id: &str) -> Result<Option<PostMetaRecord>, RepoError> {
        match self.client.get_document(&self.collections.posts, id).await? {
            Some(document) => decode_fields(document).map(Some),
            None => Ok(None),
        }
    }

    async fn get_post_content(&self, id: &str) -> Result<Option<PostContentRecord>, RepoError> {
        match self
            .client
            .get_document(&self.collections.content, id)
            .await?
        {
            Some(document) => decode_fields(document).map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PortfolioRepo for DocStoreRepositories {
    async fn list_holding_ids(&self, owner: &str) -> Result<Vec<String>, RepoError> {
        let documents = self
            .client
            .list_documents(&self.holdings_collection(owner))
            .await?;
        Ok(documents.into_iter().map(|doc| doc.id).collect())
    }

    async fn commit_batch(&self, owner: &str, batch: PortfolioBatch) -> Result<(), RepoError> {
        let holdings_collection = self.holdings_collection(owner);
        let mut writes = Vec::with_capacity(batch.delete_ids.len() + batch.holdings.len() + 2);

        for id in batch.delete_ids {
            writes.push(WriteOp::Delete {
                collection: holdings_collection.clone(),
                id,
            });
        }
        for (id, record) in batch.holdings {
            writes.push(WriteOp::Set {
                collection: holdings_collection.clone(),
                id,
                fields: serde_json::to_value(&record)
                    .map_err(|err| RepoError::decode(err.to_string()))?,
                merge: false,
            });
        }
        if let Some(fx) = batch.fx {
            writes.push(WriteOp::Set {
                collection: self.collections.market.clone(),
                id: FX_DOCUMENT_ID.to_string(),
                fields: serde_json::to_value(&fx)
                    .map_err(|err| RepoError::decode(err.to_string()))?,
                merge: true,
            });
        }
        if let Some(rates) = batch.rates {
            writes.push(WriteOp::Set {
                collection: self.collections.market.clone(),
                id: RATES_DOCUMENT_ID.to_string(),
                fields: serde_json::to_value(&rates)
                    .map_err(|err| RepoError::decode(err.to_string()))?,
                merge: true,
            });
        }

        self.client.commit(&writes).await
    }
}
