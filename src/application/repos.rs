//! Traits describing the external collaborators: document store reads and
//! batch writes, object storage, the spreadsheet source, the indicator
//! source and the SPA hosting origin.
//!
//! Every service takes these as injected `Arc<dyn …>` handles so the
//! pipeline can be exercised against in-memory implementations.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::domain::portfolio::{FxSnapshot, HoldingRecord, RatesSnapshot};
use crate::domain::posts::{PostContentRecord, PostMetaRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("upstream error: {message}")]
    Upstream { message: String },
    #[error("failed to decode upstream payload: {message}")]
    Decode { message: String },
    #[error("resource not found")]
    NotFound,
}

impl RepoError {
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}

/// Read access to the post collections in the document store.
#[async_trait]
pub trait PostsRepo: Send + Sync {
    /// Every metadata record; the sitemap is rebuilt from the full set.
    async fn list_post_meta(&self) -> Result<Vec<PostMetaRecord>, RepoError>;

    async fn get_post_meta(&self, id: &str) -> Result<Option<PostMetaRecord>, RepoError>;

    async fn get_post_content(&self, id: &str) -> Result<Option<PostContentRecord>, RepoError>;
}

/// One atomic multi-document write assembled by the sync job.
///
/// Deletes and inserts for the holdings collection travel together with the
/// optional snapshot merges so a partial failure never leaves holdings
/// half-deleted.
#[derive(Debug, Clone, Default)]
pub struct PortfolioBatch {
    /// Ids of every holding currently stored for the owner.
    pub delete_ids: Vec<String>,
    /// (document id, record) pairs to insert.
    pub holdings: Vec<(String, HoldingRecord)>,
    /// Merged into `market/fx` when present.
    pub fx: Option<FxSnapshot>,
    /// Merged into `market/rates` when present.
    pub rates: Option<RatesSnapshot>,
}

/// Holdings and market-snapshot writes against the document store.
#[async_trait]
pub trait PortfolioRepo: Send + Sync {
    async fn list_holding_ids(&self, owner: &str) -> Result<Vec<String>, RepoError>;

    /// Apply the batch atomically. Failures propagate; the caller fails the
    /// whole job rather than risk a partial replace.
    async fn commit_batch(&self, owner: &str, batch: PortfolioBatch) -> Result<(), RepoError>;
}

/// Path-addressed blob storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(
        &self,
        path: &str,
        body: Bytes,
        content_type: &str,
        public: bool,
    ) -> Result<(), RepoError>;

    async fn download(&self, path: &str) -> Result<Bytes, RepoError>;
}

/// Read-only tabular access to the external spreadsheet.
#[async_trait]
pub trait SpreadsheetSource: Send + Sync {
    /// A rectangular range as rows of cells. Trailing empty cells may be
    /// omitted by the source; row parsing must index defensively.
    async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>, RepoError>;

    /// A single-cell range; `None` when the cell is empty.
    async fn read_cell(&self, range: &str) -> Result<Option<String>, RepoError>;
}

/// One time-series observation from the macro indicator source.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub date: String,
    /// Raw value text; "." marks an unavailable point.
    pub value: String,
}

/// Public macro-indicator API returning observations newest first.
#[async_trait]
pub trait IndicatorSource: Send + Sync {
    async fn latest_observations(
        &self,
        series_id: &str,
        limit: u32,
    ) -> Result<Vec<Observation>, RepoError>;
}

/// Live access to the SPA's entry document on the hosting origin.
#[async_trait]
pub trait SpaOrigin: Send + Sync {
    async fn entry_document(&self) -> Result<String, RepoError>;
}
