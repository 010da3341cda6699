//! Object storage interface for harvested files (S3 compatible).

use std::path::Path as LocalPath;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{aws::AmazonS3Builder, path::Path, ObjectStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{StorageError, StorageResult};

/// Upload seam used by the harvest pipeline.
#[async_trait]
pub trait ObjectUploader: Send + Sync {
    /// Upload a local file under `key` and return its `scheme://bucket/key` URI.
    async fn upload(&self, local_path: &LocalPath, key: &str) -> StorageResult<String>;
}

/// Configuration for object storage connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    /// Custom S3 endpoint (MinIO etc.), AWS when unset
    pub endpoint: Option<String>,
    /// Bucket name
    pub bucket: String,
    /// Access key ID, falls back to the AWS environment when unset
    pub access_key_id: Option<String>,
    /// Secret access key
    pub secret_access_key: Option<String>,
    /// AWS region
    pub region: String,
    /// Allow HTTP (for local MinIO)
    pub allow_http: bool,
}

impl ObjectStorageConfig {
    pub fn for_bucket(bucket: impl Into<String>) -> Self {
        Self {
            endpoint: None,
            bucket: bucket.into(),
            access_key_id: None,
            secret_access_key: None,
            region: "us-west-2".to_string(),
            allow_http: false,
        }
    }
}

/// Object storage client for harvested granules.
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ObjectStorage {
    /// Create a new object storage client from config.
    pub fn new(config: &ObjectStorageConfig) -> StorageResult<Self> {
        if config.bucket.trim().is_empty() {
            return Err(StorageError::Config("bucket name is empty".to_string()));
        }

        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let Some(key) = &config.access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(secret) = &config.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::Config(format!("Failed to create S3 client: {}", e)))?;

        Ok(Self::with_store(Arc::new(store), &config.bucket))
    }

    /// Wrap an existing store (in-memory stores in tests).
    pub fn with_store(store: Arc<dyn ObjectStore>, bucket: &str) -> Self {
        Self {
            store,
            bucket: bucket.to_string(),
        }
    }

    /// URI recorded in harvest documents for an uploaded key.
    pub fn uri_for(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }

    /// Write bytes to a path in the bucket.
    #[instrument(skip(self, data), fields(bucket = %self.bucket, path = %path))]
    pub async fn put(&self, path: &str, data: Bytes) -> StorageResult<()> {
        let location = Path::from(path);
        debug!(size = data.len(), "Writing object");

        self.store
            .put(&location, data.into())
            .await
            .map_err(|e| StorageError::ObjectStore(format!("Failed to write {}: {}", path, e)))?;

        Ok(())
    }

    /// Read bytes from a path.
    #[instrument(skip(self), fields(bucket = %self.bucket, path = %path))]
    pub async fn get(&self, path: &str) -> StorageResult<Bytes> {
        let location = Path::from(path);

        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| StorageError::ObjectStore(format!("Failed to read {}: {}", path, e)))?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::ObjectStore(format!("Failed to read bytes: {}", e)))?;

        debug!(size = bytes.len(), "Read object");
        Ok(bytes)
    }
}

#[async_trait]
impl ObjectUploader for ObjectStorage {
    #[instrument(skip(self), fields(bucket = %self.bucket, local = %local_path.display()))]
    async fn upload(&self, local_path: &LocalPath, key: &str) -> StorageResult<String> {
        let data = tokio::fs::read(local_path).await?;
        self.put(key, Bytes::from(data)).await?;
        Ok(self.uri_for(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    #[test]
    fn test_uri_for_key() {
        let storage = ObjectStorage::with_store(Arc::new(InMemory::new()), "ecco-harvest");
        assert_eq!(
            storage.uri_for("SMAP/sss_20200101.nc"),
            "s3://ecco-harvest/SMAP/sss_20200101.nc"
        );
    }

    #[test]
    fn test_rejects_empty_bucket() {
        let config = ObjectStorageConfig::for_bucket("  ");
        assert!(matches!(ObjectStorage::new(&config), Err(StorageError::Config(_))));
    }

    #[tokio::test]
    async fn test_upload_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("granule.nc");
        std::fs::write(&local, b"netcdf bytes").unwrap();

        let storage = ObjectStorage::with_store(Arc::new(InMemory::new()), "bucket");
        let uri = tokio_test::assert_ok!(storage.upload(&local, "ds/granule.nc").await);

        assert_eq!(uri, "s3://bucket/ds/granule.nc");
        assert_eq!(
            storage.get("ds/granule.nc").await.unwrap(),
            Bytes::from_static(b"netcdf bytes")
        );
    }

    #[tokio::test]
    async fn test_upload_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ObjectStorage::with_store(Arc::new(InMemory::new()), "bucket");
        let err = tokio_test::assert_err!(
            storage
                .upload(&dir.path().join("missing.nc"), "ds/missing.nc")
                .await
        );
        assert!(matches!(err, StorageError::LocalRead(_)));
    }
}
