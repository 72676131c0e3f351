use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Health/metrics listener address (e.g., "0.0.0.0:9100").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Redis connection string for the job queue
    pub redis_url: String,

    /// Name of the Redis list jobs are pushed onto
    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    /// Names this worker's in-flight list. Must be unique among workers on the
    /// same queue and stable across restarts of the same worker, because
    /// startup recovery requeues everything on that list.
    pub worker_id: String,

    /// How long an idle worker waits before polling the queue again
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Keep rejected payloads on `<queue>:dead` for manual replay
    #[serde(default = "default_dead_letter")]
    pub dead_letter: bool,

    /// PostgreSQL connection string
    pub database_url: String,

    /// MinIO / S3 endpoint, with or without scheme (e.g., "minio:9000")
    pub minio_endpoint: String,

    /// MinIO access key ID
    pub minio_access_key: String,

    /// MinIO secret access key
    pub minio_secret_key: String,

    #[serde(default = "default_minio_region")]
    pub minio_region: String,

    /// Use https when the endpoint carries no scheme
    #[serde(default)]
    pub minio_secure: bool,

    /// Elasticsearch base URL. When unset, extracts are written to Postgres only.
    #[serde(default)]
    pub elasticsearch_url: Option<String>,

    #[serde(default = "default_elasticsearch_index")]
    pub elasticsearch_index: String,

    /// Upper bound on one index request
    #[serde(default = "default_elasticsearch_timeout_ms")]
    pub elasticsearch_timeout_ms: u64,

    /// Overrides Tesseract's language data directory
    #[serde(default)]
    pub tessdata_prefix: Option<PathBuf>,

    #[serde(default = "default_tesseract_bin")]
    pub tesseract_bin: PathBuf,

    /// Where downloaded and preprocessed images are written. Defaults to the OS temp dir.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:9100".to_string()
}

fn default_queue_name() -> String {
    "extraction_queue".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_dead_letter() -> bool {
    true
}

fn default_minio_region() -> String {
    "us-east-1".to_string()
}

fn default_elasticsearch_index() -> String {
    "documents".to_string()
}

fn default_elasticsearch_timeout_ms() -> u64 {
    10_000
}

fn default_tesseract_bin() -> PathBuf {
    PathBuf::from("tesseract")
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn elasticsearch_timeout(&self) -> Duration {
        Duration::from_millis(self.elasticsearch_timeout_ms)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// MinIO endpoint as a full URL. Bare `host:port` values get a scheme from `minio_secure`.
    pub fn minio_url(&self) -> String {
        if self.minio_endpoint.contains("://") {
            return self.minio_endpoint.clone();
        }
        let scheme = if self.minio_secure { "https" } else { "http" };
        format!("{}://{}", scheme, self.minio_endpoint)
    }

    /// Treats an empty `ELASTICSEARCH_URL` the same as an unset one.
    pub fn search_index_url(&self) -> Option<&str> {
        self.elasticsearch_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}
