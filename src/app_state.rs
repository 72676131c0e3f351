use sqlx::PgPool;
use std::path::PathBuf;
use std::sync::Arc;

use crate::services::{
    index::ElasticsearchIndex,
    ocr::TesseractCli,
    queue::JobQueue,
    sink::{PersistenceSink, PgExtractStore},
    storage::S3Store,
};
use crate::worker::Worker;

/// Process-wide clients, created once at startup and shared by every job.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub storage: Arc<S3Store>,
    pub queue: Arc<JobQueue>,
    pub ocr: Arc<TesseractCli>,
    pub index: Option<Arc<ElasticsearchIndex>>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        storage: S3Store,
        queue: JobQueue,
        ocr: TesseractCli,
        index: Option<ElasticsearchIndex>,
    ) -> Self {
        Self {
            db,
            storage: Arc::new(storage),
            queue: Arc::new(queue),
            ocr: Arc::new(ocr),
            index: index.map(Arc::new),
        }
    }

    /// Dual-write when a search index is configured, relational-only otherwise.
    pub fn sink(&self) -> PersistenceSink {
        let store = Arc::new(PgExtractStore::new(self.db.clone()));
        match &self.index {
            Some(index) => PersistenceSink::dual_write(store, index.clone()),
            None => PersistenceSink::relational_only(store),
        }
    }

    pub fn worker(&self, scratch_dir: impl Into<PathBuf>) -> Worker {
        Worker::new(self.storage.clone(), self.ocr.clone(), self.sink(), scratch_dir)
    }
}
