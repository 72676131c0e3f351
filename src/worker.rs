//! Job consumer.
//!
//! Drives one job at a time through fetch, preprocess, recognize and persist,
//! and turns the outcome into exactly one acknowledgment. Every failure is a
//! reject without requeue. Scratch files are released before the broker
//! hears about the outcome.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;

use crate::models::job::{AckDecision, ExtractionJob, ExtractionResult, Stage};
use crate::services::normalize::normalize;
use crate::services::ocr::{RecognitionError, TextRecognizer};
use crate::services::preprocess::{preprocess_file, PreprocessError};
use crate::services::queue::{Delivery, JobSource, QueueError, Rejection};
use crate::services::scratch::ScratchFile;
use crate::services::sink::{IndexOutcome, PersistenceError, PersistenceSink};
use crate::services::storage::{ObjectStore, StorageError};
use crate::shutdown::ShutdownSignal;

/// Failure of one pipeline stage.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Failed to fetch image: {0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to preprocess image: {0}")]
    Decode(#[from] PreprocessError),

    #[error("No text areas detected in the image")]
    NoTextRegionDetected,

    #[error("Failed to perform OCR: {0}")]
    Recognition(#[from] RecognitionError),

    #[error("Failed to store extract: {0}")]
    Persistence(#[from] PersistenceError),
}

impl JobError {
    /// The stage that failed.
    pub fn stage(&self) -> Stage {
        match self {
            JobError::Fetch(_) => Stage::Fetching,
            JobError::Decode(_) | JobError::NoTextRegionDetected => Stage::Preprocessing,
            JobError::Recognition(_) => Stage::Recognizing,
            JobError::Persistence(_) => Stage::Persisting,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Failed to write downloaded object: {0}")]
    Io(#[from] std::io::Error),
}

/// How a job concluded.
#[derive(Debug)]
pub struct JobOutcome {
    pub decision: AckDecision,
    /// Set when the job was rejected.
    pub error: Option<JobError>,
    /// Set when text was handed to the persistence sink.
    pub index: Option<IndexOutcome>,
}

impl JobOutcome {
    fn acknowledged(index: Option<IndexOutcome>) -> Self {
        Self {
            decision: AckDecision::Acknowledge,
            error: None,
            index,
        }
    }

    fn rejected(error: JobError) -> Self {
        Self {
            decision: AckDecision::RejectNoRequeue,
            error: Some(error),
            index: None,
        }
    }

    pub fn is_acknowledged(&self) -> bool {
        self.decision == AckDecision::Acknowledge
    }
}

/// Counters for one run of the consume loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    pub acknowledged: u64,
    pub rejected: u64,
    /// Conclusions the broker did not accept, even after one retry. Those
    /// deliveries stay on the in-flight list, and the next start's recovery
    /// puts them back on the queue. A failed reject therefore becomes one
    /// more attempt rather than a dead letter.
    pub broker_errors: u64,
}

/// Serial extraction worker. Collaborators are shared, long-lived clients.
pub struct Worker {
    storage: Arc<dyn ObjectStore>,
    recognizer: Arc<dyn TextRecognizer>,
    sink: PersistenceSink,
    scratch_dir: PathBuf,
}

impl Worker {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        recognizer: Arc<dyn TextRecognizer>,
        sink: PersistenceSink,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            storage,
            recognizer,
            sink,
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Consume jobs until `shutdown` fires.
    ///
    /// The signal is checked before every dequeue and interrupts idle waits;
    /// a job already taken always runs to its acknowledgment first.
    pub async fn run<S>(
        &self,
        source: &S,
        mut shutdown: ShutdownSignal,
        poll_interval: Duration,
    ) -> ConsumerStats
    where
        S: JobSource + ?Sized,
    {
        let mut stats = ConsumerStats::default();
        tracing::info!(sink = %self.sink.mode(), "Worker ready, starting job processing loop");

        while !shutdown.is_triggered() {
            let delivery = match source.receive().await {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    tracing::trace!("No jobs available, sleeping");
                    idle(&mut shutdown, poll_interval).await;
                    continue;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to receive job, will retry");
                    idle(&mut shutdown, poll_interval).await;
                    continue;
                }
            };

            let (decision, rejection) = self.handle(&delivery).await;
            let concluded = match conclude(source, &delivery, rejection.as_ref()).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    tracing::warn!(error = %e, decision = %decision, "Failed to conclude delivery, retrying once");
                    conclude(source, &delivery, rejection.as_ref()).await
                }
            };

            match concluded {
                Ok(()) => match decision {
                    AckDecision::Acknowledge => stats.acknowledged += 1,
                    AckDecision::RejectNoRequeue => stats.rejected += 1,
                },
                Err(e) => {
                    stats.broker_errors += 1;
                    tracing::error!(
                        error = %e,
                        decision = %decision,
                        "Failed to conclude delivery after retry; it stays in flight"
                    );
                }
            }
        }

        tracing::info!(
            acknowledged = stats.acknowledged,
            rejected = stats.rejected,
            "Shutdown requested, consumer loop exiting"
        );
        stats
    }

    /// Decide the acknowledgment for one delivery.
    async fn handle(&self, delivery: &Delivery) -> (AckDecision, Option<Rejection>) {
        let job = match delivery.job() {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(error = %e, payload = %delivery.payload(), "Discarding malformed job");
                record_decision(AckDecision::RejectNoRequeue);
                let rejection = Rejection {
                    stage: Stage::Idle,
                    reason: e.to_string(),
                };
                return (AckDecision::RejectNoRequeue, Some(rejection));
            }
        };

        let outcome = self.process(&job).await;
        let rejection = outcome.error.as_ref().map(|e| Rejection {
            stage: e.stage(),
            reason: e.to_string(),
        });
        (outcome.decision, rejection)
    }

    /// Run one job through the pipeline. Never panics on job data and always
    /// leaves the scratch directory as it found it.
    pub async fn process(&self, job: &ExtractionJob) -> JobOutcome {
        tracing::info!(
            document_id = job.document_id,
            file_key = %job.file_key,
            bucket = %job.bucket,
            language = %job.language(),
            "Processing extraction job"
        );

        let start = Instant::now();
        let result = self.run_pipeline(job).await;
        metrics::histogram!("extraction_job_seconds").record(start.elapsed().as_secs_f64());

        let outcome = match result {
            Ok(index) => {
                tracing::info!(
                    document_id = job.document_id,
                    duration_ms = start.elapsed().as_millis() as u64,
                    index = ?index,
                    "Job completed"
                );
                JobOutcome::acknowledged(index)
            }
            Err(e) => {
                let stage: &'static str = e.stage().into();
                metrics::counter!("extraction_stage_failures_total", "stage" => stage).increment(1);
                if matches!(e, JobError::NoTextRegionDetected) {
                    tracing::warn!(
                        document_id = job.document_id,
                        stage,
                        "Skipping OCR due to lack of detectable text areas"
                    );
                } else {
                    tracing::error!(document_id = job.document_id, stage, error = %e, "Job failed");
                }
                JobOutcome::rejected(e)
            }
        };

        record_decision(outcome.decision);
        outcome
    }

    async fn run_pipeline(&self, job: &ExtractionJob) -> Result<Option<IndexOutcome>, JobError> {
        tracing::debug!(document_id = job.document_id, stage = %Stage::Fetching, "Stage started");
        let raw = self.fetch(job).await?;

        tracing::debug!(document_id = job.document_id, stage = %Stage::Preprocessing, "Stage started");
        let prepared = match self.preprocess(&raw).await {
            Ok(Some(prepared)) => prepared,
            Ok(None) => {
                raw.release();
                return Err(JobError::NoTextRegionDetected);
            }
            Err(e) => {
                raw.release();
                return Err(e.into());
            }
        };

        tracing::debug!(document_id = job.document_id, stage = %Stage::Recognizing, "Stage started");
        let recognized = self
            .recognizer
            .recognize(prepared.path(), job.language())
            .await;
        raw.release();
        prepared.release();
        let raw_text = recognized?;

        if raw_text.is_empty() {
            tracing::info!(document_id = job.document_id, "Recognizer returned no output; nothing to store");
            return Ok(None);
        }

        let text = normalize(&raw_text);
        tracing::debug!(
            document_id = job.document_id,
            stage = %Stage::Persisting,
            raw_chars = raw_text.chars().count(),
            chars = text.chars().count(),
            "Stage started"
        );
        let index = self
            .sink
            .persist(&ExtractionResult {
                document_id: job.document_id,
                user_id: job.user_id,
                text,
            })
            .await?;

        Ok(Some(index))
    }

    async fn fetch(&self, job: &ExtractionJob) -> Result<ScratchFile, FetchError> {
        let bytes = self.storage.fetch(&job.bucket, &job.file_key).await?;
        let suffix = format!(".{}", job.extension);
        let raw = ScratchFile::write(&self.scratch_dir, job.file_name(), &suffix, &bytes)?;
        tracing::debug!(
            document_id = job.document_id,
            path = %raw.path().display(),
            bytes = bytes.len(),
            "Downloaded image"
        );
        Ok(raw)
    }

    async fn preprocess(&self, raw: &ScratchFile) -> Result<Option<ScratchFile>, PreprocessError> {
        let source = raw.path().to_path_buf();
        let scratch_dir = self.scratch_dir.clone();
        tokio::task::spawn_blocking(move || preprocess_file(&source, &scratch_dir)).await?
    }
}

async fn conclude<S>(
    source: &S,
    delivery: &Delivery,
    rejection: Option<&Rejection>,
) -> Result<(), QueueError>
where
    S: JobSource + ?Sized,
{
    match rejection {
        None => source.ack(delivery).await,
        Some(rejection) => source.reject(delivery, rejection).await,
    }
}

async fn idle(shutdown: &mut ShutdownSignal, interval: Duration) {
    tokio::select! {
        _ = sleep(interval) => {}
        _ = shutdown.triggered() => {}
    }
}

fn record_decision(decision: AckDecision) {
    let label: &'static str = decision.into();
    metrics::counter!("extraction_jobs_total", "decision" => label).increment(1);
}
