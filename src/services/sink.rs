use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use strum::Display;

use crate::db::queries;
use crate::models::job::ExtractionResult;
use crate::services::index::{IndexDocument, SearchIndex};

/// The system of record for document extracts.
#[async_trait]
pub trait ExtractStore: Send + Sync {
    /// Set the extract column of a document. Returns rows updated.
    async fn update_extract(&self, document_id: i64, text: &str) -> Result<u64, PersistenceError>;
}

/// `documents.extract` in PostgreSQL.
pub struct PgExtractStore {
    pool: PgPool,
}

impl PgExtractStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExtractStore for PgExtractStore {
    async fn update_extract(&self, document_id: i64, text: &str) -> Result<u64, PersistenceError> {
        Ok(queries::update_document_extract(&self.pool, document_id, text).await?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SinkMode {
    /// Relational store plus search index.
    DualWrite,
    RelationalOnly,
}

/// What happened to the search index side of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum IndexOutcome {
    Indexed,
    /// No index configured.
    Skipped,
    /// Index update failed; the extract is stored but not searchable yet.
    Failed,
}

/// Writes extraction results to the relational store and, when configured,
/// the search index.
///
/// Only a relational failure is an error. Index failures are logged and
/// reported as [`IndexOutcome::Failed`].
#[derive(Clone)]
pub struct PersistenceSink {
    store: Arc<dyn ExtractStore>,
    index: Option<Arc<dyn SearchIndex>>,
}

impl PersistenceSink {
    pub fn relational_only(store: Arc<dyn ExtractStore>) -> Self {
        Self { store, index: None }
    }

    pub fn dual_write(store: Arc<dyn ExtractStore>, index: Arc<dyn SearchIndex>) -> Self {
        Self {
            store,
            index: Some(index),
        }
    }

    pub fn mode(&self) -> SinkMode {
        if self.index.is_some() {
            SinkMode::DualWrite
        } else {
            SinkMode::RelationalOnly
        }
    }

    pub async fn persist(&self, result: &ExtractionResult) -> Result<IndexOutcome, PersistenceError> {
        let rows = self
            .store
            .update_extract(result.document_id, &result.text)
            .await?;

        if rows == 0 {
            tracing::warn!(
                document_id = result.document_id,
                "Document row not found; extract not stored"
            );
        }

        let Some(index) = &self.index else {
            return Ok(IndexOutcome::Skipped);
        };

        let doc = IndexDocument {
            document_id: result.document_id,
            user_id: result.user_id,
            text: result.text.clone(),
        };

        match index.upsert(&doc).await {
            Ok(()) => {
                tracing::info!(document_id = result.document_id, "Indexed document");
                Ok(IndexOutcome::Indexed)
            }
            Err(e) => {
                metrics::counter!("extraction_index_failures_total").increment(1);
                tracing::error!(
                    document_id = result.document_id,
                    error = %e,
                    "Failed to index document; extract is stored"
                );
                Ok(IndexOutcome::Failed)
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
