use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

/// Recognition language used when a job carries no usable hint.
pub const DEFAULT_LANGUAGE: &str = "eng";

/// One unit of extraction work, as published by the upload API.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ExtractionJob {
    #[serde(rename = "documentID")]
    #[garde(skip)]
    pub document_id: i64,

    #[serde(rename = "fileKey")]
    #[garde(length(min = 1, max = 1024))]
    pub file_key: String,

    #[garde(length(min = 1, max = 255))]
    pub bucket: String,

    #[garde(ascii, alphanumeric, length(min = 1, max = 16))]
    pub extension: String,

    #[serde(default)]
    #[garde(skip)]
    pub language: Option<String>,

    #[serde(rename = "userID", default)]
    #[garde(skip)]
    pub user_id: Option<i64>,
}

impl ExtractionJob {
    /// Parse and validate a raw queue payload.
    pub fn from_payload(payload: &str) -> Result<Self, JobParseError> {
        let job: ExtractionJob = serde_json::from_str(payload)?;
        job.validate()
            .map_err(|report| JobParseError::Invalid(report.to_string()))?;
        Ok(job)
    }

    /// The language hint, or `eng` when absent or blank.
    pub fn language(&self) -> &str {
        match self.language.as_deref().map(str::trim) {
            Some(lang) if !lang.is_empty() => lang,
            _ => DEFAULT_LANGUAGE,
        }
    }

    /// Last path segment of the storage key, used to name local scratch files.
    pub fn file_name(&self) -> &str {
        self.file_key
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("object")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobParseError {
    #[error("Malformed job payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid job payload: {0}")]
    Invalid(String),
}

/// Terminal response sent to the broker for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum AckDecision {
    Acknowledge,
    /// Negative acknowledgment; the broker must not redeliver.
    RejectNoRequeue,
}

/// Where a job is in the extraction pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Fetching,
    Preprocessing,
    Recognizing,
    Persisting,
    Concluded,
}

/// Text ready for the persistence sink.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub document_id: i64,
    pub user_id: Option<i64>,
    pub text: String,
}
