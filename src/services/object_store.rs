//! Object store capability consumed by the upload engine.
//!
//! The bucket is fixed when a backend is constructed, so every call only names
//! the key. Backends live in `fs_store` (local disk) and `s3_store` (S3).

use crate::models::multipart::PartDescriptor;
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error("multipart upload `{0}` not found")]
    UploadNotFound(String),
    #[error("multipart upload `{upload_id}` rejected: {reason}")]
    InvalidParts { upload_id: String, reason: String },
    #[error("{operation} failed: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Wrap any SDK or transport error raised while performing `operation`.
    pub fn backend<E>(operation: &'static str, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            operation,
            source: Box::new(error),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Narrow view of an S3-style object store.
///
/// Implementations are shared across concurrent uploads; they must not keep
/// per-upload state beyond what the store itself tracks by upload id.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Start a multipart upload and return its opaque upload id.
    async fn initiate_multipart(&self, key: &str) -> StoreResult<String>;

    /// Upload one part and return its ETag.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StoreResult<String>;

    /// Assemble the uploaded parts, in order, into the final object.
    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartDescriptor],
    ) -> StoreResult<()>;

    /// Discard a multipart upload and any parts already stored.
    async fn abort_multipart(&self, key: &str, upload_id: &str) -> StoreResult<()>;

    /// Write a whole object in one request.
    async fn put_object(&self, key: &str, content_length: u64, body: Bytes) -> StoreResult<()>;

    /// Cheap connectivity check used by the readiness probe.
    async fn check_ready(&self) -> StoreResult<()>;
}
