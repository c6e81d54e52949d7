//! Blob storage for uploaded resumes and their rendered page images.
//!
//! Keys are `/`-separated relative paths produced by [`upload_key`] and [`page_image_key`];
//! callers never build keys from raw client input.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{S3Config, StorageConfig};

const FALLBACK_FILENAME: &str = "resume.pdf";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object '{0}' not found")]
    NotFound(String),

    #[error("I/O error on '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("S3 error on '{key}': {message}")]
    S3 { key: String, message: String },
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StorageError>;
    async fn get(&self, key: &str) -> Result<Bytes, StorageError>;
}

/// Where an uploaded resume is written: `uploads/<id>/<filename>`.
pub fn upload_key(file_id: Uuid, filename: &str) -> String {
    format!("uploads/{file_id}/{}", sanitize_filename(filename))
}

/// Where page `index` (0-based) of a resume is written after rasterisation.
pub fn page_image_key(file_id: Uuid, index: usize, extension: &str) -> String {
    format!("uploads/images/{file_id}/image-{index}.{extension}")
}

/// Reduces a client-supplied filename to its final path component.
pub fn sanitize_filename(filename: &str) -> String {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        FALLBACK_FILENAME.to_string()
    } else {
        name.to_string()
    }
}

/// Builds the configured blob store.
pub async fn from_config(config: &StorageConfig) -> Arc<dyn BlobStore> {
    match config {
        StorageConfig::Local { root } => {
            info!("Blob storage: local directory {}", root.display());
            Arc::new(LocalBlobStore::new(root.clone()))
        }
        StorageConfig::S3(s3) => {
            info!("Blob storage: s3://{} via {}", s3.bucket, s3.endpoint);
            Arc::new(S3BlobStore::new(s3).await)
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Local disk
// ────────────────────────────────────────────────────────────────────────────

/// Files under a root directory. Parent directories are created on write.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|segment| !matches!(*segment, "" | "." | ".."))
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&path, &bytes).await.map_err(io_err)?;
        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// S3 / MinIO
// ────────────────────────────────────────────────────────────────────────────

pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3BlobStore {
    /// Constructs an S3 client configured for MinIO (local) or AWS (production).
    pub async fn new(config: &S3Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "resume-review-static",
        );

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(credentials)
            .endpoint_url(&config.endpoint)
            .load()
            .await;

        Self {
            client: aws_sdk_s3::Client::new(&sdk_config),
            bucket: config.bucket.clone(),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StorageError> {
        let content_type = if key.ends_with(".png") {
            "image/png"
        } else {
            "application/pdf"
        };
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::S3 {
                key: key.to_string(),
                message: format!("upload failed: {e}"),
            })?;
        debug!("Uploaded s3://{}/{}", self.bucket, key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::S3 {
                        key: key.to_string(),
                        message: format!("download failed: {e}"),
                    }
                }
            })?;

        let data = output.body.collect().await.map_err(|e| StorageError::S3 {
            key: key.to_string(),
            message: format!("body read failed: {e}"),
        })?;
        Ok(data.into_bytes())
    }
}
