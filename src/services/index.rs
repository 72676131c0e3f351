use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

/// Search document mirroring a document's extract.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IndexDocument {
    pub document_id: i64,
    pub user_id: Option<i64>,
    pub text: String,
}

/// Secondary, best-effort search view of extracted text.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Create or replace the search document keyed by `doc.document_id`.
    async fn upsert(&self, doc: &IndexDocument) -> Result<(), IndexError>;
}

/// Elasticsearch index client speaking the REST document API.
pub struct ElasticsearchIndex {
    http: Client,
    base_url: String,
    index: String,
}

impl ElasticsearchIndex {
    /// `timeout` bounds each request end to end, so a stalled node turns into
    /// an index failure instead of holding up the job.
    pub fn new(base_url: &str, index: &str, timeout: Duration) -> Result<Self, IndexError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("doc-extract-worker/0.1")
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            index: index.to_string(),
        })
    }

    fn document_url(&self, document_id: i64) -> String {
        format!("{}/{}/_doc/{}", self.base_url, self.index, document_id)
    }
}

#[async_trait]
impl SearchIndex for ElasticsearchIndex {
    async fn upsert(&self, doc: &IndexDocument) -> Result<(), IndexError> {
        let response = self
            .http
            .put(self.document_url(doc.document_id))
            .json(doc)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Index responded with status {status}: {body}")]
    Status { status: u16, body: String },
}
