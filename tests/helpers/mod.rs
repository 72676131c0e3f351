//! In-memory stand-ins for the worker's collaborators

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use doc_extract_worker::services::{
    index::{IndexDocument, IndexError, SearchIndex},
    ocr::{RecognitionError, TextRecognizer},
    queue::{Delivery, JobSource, QueueError, Rejection},
    sink::{ExtractStore, PersistenceError, PersistenceSink},
    storage::{ObjectStore, StorageError},
};
use doc_extract_worker::shutdown::ShutdownTrigger;
use doc_extract_worker::worker::Worker;

/// Object store backed by a map. Missing objects fail like a 404.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn with(bucket: &str, key: &str, data: Vec<u8>) -> Self {
        let store = Self::default();
        store.put(bucket, key, data);
        store
    }

    pub fn put(&self, bucket: &str, key: &str, data: Vec<u8>) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), data);
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::Status {
                bucket: bucket.to_string(),
                key: key.to_string(),
                status: 404,
            })
    }

    async fn store(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        _content_type: &str,
    ) -> Result<(), StorageError> {
        self.put(bucket, key, data.to_vec());
        Ok(())
    }
}

/// A call the recognizer saw.
#[derive(Debug, Clone)]
pub struct RecognizeCall {
    pub language: String,
    pub image_existed: bool,
    pub file_name: String,
}

/// Returns canned text for supported languages and fails for the rest.
pub struct FakeRecognizer {
    text: String,
    languages: Vec<String>,
    calls: Mutex<Vec<RecognizeCall>>,
    shutdown_on_call: Option<ShutdownTrigger>,
}

impl FakeRecognizer {
    pub fn returning(text: &str) -> Self {
        Self {
            text: text.to_string(),
            languages: vec!["eng".to_string(), "nep".to_string()],
            calls: Mutex::new(Vec::new()),
            shutdown_on_call: None,
        }
    }

    /// Fire `trigger` while a job is mid-recognition.
    pub fn triggering_shutdown(mut self, trigger: ShutdownTrigger) -> Self {
        self.shutdown_on_call = Some(trigger);
        self
    }

    pub fn calls(&self) -> Vec<RecognizeCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextRecognizer for FakeRecognizer {
    async fn recognize(&self, image: &Path, language: &str) -> Result<String, RecognitionError> {
        self.calls.lock().unwrap().push(RecognizeCall {
            language: language.to_string(),
            image_existed: image.exists(),
            file_name: image
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        });
        if let Some(trigger) = &self.shutdown_on_call {
            trigger.trigger();
        }
        if !self.languages.iter().any(|l| l == language) {
            return Err(RecognitionError::Engine {
                status: Some(1),
                stderr: format!("Failed loading language '{}'", language),
            });
        }
        Ok(self.text.clone())
    }
}

/// Records every extract update; optionally fails them all.
#[derive(Default)]
pub struct RecordingStore {
    updates: Mutex<Vec<(i64, String)>>,
    fail: bool,
}

impl RecordingStore {
    pub fn failing() -> Self {
        Self {
            updates: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn updates(&self) -> Vec<(i64, String)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtractStore for RecordingStore {
    async fn update_extract(&self, document_id: i64, text: &str) -> Result<u64, PersistenceError> {
        self.updates
            .lock()
            .unwrap()
            .push((document_id, text.to_string()));
        if self.fail {
            return Err(PersistenceError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(1)
    }
}

/// Records indexed documents; optionally fails every upsert.
#[derive(Default)]
pub struct RecordingIndex {
    docs: Mutex<Vec<IndexDocument>>,
    fail: bool,
}

impl RecordingIndex {
    pub fn failing() -> Self {
        Self {
            docs: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn docs(&self) -> Vec<IndexDocument> {
        self.docs.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchIndex for RecordingIndex {
    async fn upsert(&self, doc: &IndexDocument) -> Result<(), IndexError> {
        self.docs.lock().unwrap().push(doc.clone());
        if self.fail {
            return Err(IndexError::Status {
                status: 503,
                body: "cluster unavailable".to_string(),
            });
        }
        Ok(())
    }
}

/// Queue with the same contract as the Redis one, kept in memory.
#[derive(Default)]
pub struct MemoryQueue {
    pending: Mutex<VecDeque<Delivery>>,
    in_flight: Mutex<Vec<Delivery>>,
    acked: Mutex<Vec<Delivery>>,
    rejected: Mutex<Vec<(Delivery, Rejection)>>,
    receives: Mutex<usize>,
    shutdown_when_empty: Option<ShutdownTrigger>,
    conclusion_failures: Mutex<usize>,
}

impl MemoryQueue {
    pub fn with_payloads<I, S>(payloads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queue = Self::default();
        queue
            .pending
            .lock()
            .unwrap()
            .extend(payloads.into_iter().map(Delivery::new));
        queue
    }

    /// Trigger shutdown the first time a receive finds nothing to deliver.
    pub fn shutdown_when_empty(mut self, trigger: ShutdownTrigger) -> Self {
        self.shutdown_when_empty = Some(trigger);
        self
    }

    /// Every ack and reject fails, as if the broker connection dropped.
    pub fn failing_conclusions(self) -> Self {
        self.failing_conclusions_times(usize::MAX)
    }

    /// The next `n` acks or rejects fail, then the broker recovers.
    pub fn failing_conclusions_times(self, n: usize) -> Self {
        *self.conclusion_failures.lock().unwrap() = n;
        self
    }

    fn broker_fails(&self) -> bool {
        let mut left = self.conclusion_failures.lock().unwrap();
        if *left == 0 {
            return false;
        }
        *left -= 1;
        true
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }

    pub fn acked(&self) -> Vec<Delivery> {
        self.acked.lock().unwrap().clone()
    }

    pub fn rejected(&self) -> Vec<(Delivery, Rejection)> {
        self.rejected.lock().unwrap().clone()
    }

    pub fn receives(&self) -> usize {
        *self.receives.lock().unwrap()
    }

    fn take_in_flight(&self, delivery: &Delivery) {
        let mut in_flight = self.in_flight.lock().unwrap();
        let idx = in_flight
            .iter()
            .position(|d| d == delivery)
            .expect("concluded a delivery that was not in flight");
        in_flight.remove(idx);
    }

    fn broker_down() -> QueueError {
        QueueError::Redis(redis::RedisError::from((
            redis::ErrorKind::IoError,
            "connection reset",
        )))
    }
}

#[async_trait]
impl JobSource for MemoryQueue {
    async fn receive(&self) -> Result<Option<Delivery>, QueueError> {
        *self.receives.lock().unwrap() += 1;
        let next = self.pending.lock().unwrap().pop_front();
        match next {
            Some(delivery) => {
                let mut in_flight = self.in_flight.lock().unwrap();
                assert!(in_flight.is_empty(), "prefetch exceeded: more than one job in flight");
                in_flight.push(delivery.clone());
                Ok(Some(delivery))
            }
            None => {
                if let Some(trigger) = &self.shutdown_when_empty {
                    trigger.trigger();
                }
                Ok(None)
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        if self.broker_fails() {
            return Err(Self::broker_down());
        }
        self.take_in_flight(delivery);
        self.acked.lock().unwrap().push(delivery.clone());
        Ok(())
    }

    async fn reject(&self, delivery: &Delivery, rejection: &Rejection) -> Result<(), QueueError> {
        if self.broker_fails() {
            return Err(Self::broker_down());
        }
        self.take_in_flight(delivery);
        self.rejected
            .lock()
            .unwrap()
            .push((delivery.clone(), rejection.clone()));
        Ok(())
    }
}

/// A worker wired to fakes, plus handles to inspect them.
pub struct Harness {
    pub worker: Worker,
    pub storage: Arc<MemoryStore>,
    pub recognizer: Arc<FakeRecognizer>,
    pub store: Arc<RecordingStore>,
    pub index: Option<Arc<RecordingIndex>>,
    pub scratch: tempfile::TempDir,
}

impl Harness {
    pub fn new(
        storage: MemoryStore,
        recognizer: FakeRecognizer,
        store: RecordingStore,
        index: Option<RecordingIndex>,
    ) -> Self {
        let storage = Arc::new(storage);
        let recognizer = Arc::new(recognizer);
        let store = Arc::new(store);
        let index = index.map(Arc::new);
        let sink = match &index {
            Some(index) => PersistenceSink::dual_write(store.clone(), index.clone()),
            None => PersistenceSink::relational_only(store.clone()),
        };
        let scratch = tempfile::tempdir().unwrap();
        let worker = Worker::new(storage.clone(), recognizer.clone(), sink, scratch.path());
        Self {
            worker,
            storage,
            recognizer,
            store,
            index,
            scratch,
        }
    }

    /// Files currently in the worker's scratch directory.
    pub fn scratch_files(&self) -> Vec<String> {
        std::fs::read_dir(self.scratch.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }
}
