use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};

/// Object storage holding uploaded documents.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download an object's bytes.
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Upload bytes under `key`.
    async fn store(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError>;
}

/// Client for MinIO (or any S3-compatible store) using path-style addressing.
pub struct S3Store {
    region: Region,
    credentials: Credentials,
}

impl S3Store {
    pub fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self { region, credentials })
    }

    fn bucket(&self, name: &str) -> Result<Box<Bucket>, StorageError> {
        let bucket = Bucket::new(name, self.region.clone(), self.credentials.clone())
            .map_err(|e| StorageError::Config(e.to_string()))?;
        Ok(bucket.with_path_style())
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self.bucket(bucket)?.get_object(key).await?;
        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(StorageError::Status {
                bucket: bucket.to_string(),
                key: key.to_string(),
                status,
            });
        }
        Ok(response.to_vec())
    }

    async fn store(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError> {
        let response = self
            .bucket(bucket)?
            .put_object_with_content_type(key, data, content_type)
            .await?;
        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(StorageError::Status {
                bucket: bucket.to_string(),
                key: key.to_string(),
                status,
            });
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Object {bucket}/{key} returned status {status}")]
    Status {
        bucket: String,
        key: String,
        status: u16,
    },

    #[error("Storage configuration error: {0}")]
    Config(String),
}
