//! S3 backend for [`ObjectStore`] using the AWS SDK.

use crate::{
    models::multipart::PartDescriptor,
    services::object_store::{ObjectStore, StoreError, StoreResult},
};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::{
    Client,
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
};
use bytes::Bytes;
use std::io;
use tracing::debug;

/// Connection settings for an S3 (or S3-compatible) endpoint.
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
}

#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build a client from the default credential chain, applying any
    /// region/endpoint overrides. A custom endpoint switches to path-style
    /// addressing for S3-compatible servers.
    pub async fn connect(bucket: impl Into<String>, settings: S3Settings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = settings.region.clone() {
            loader = loader.region(Region::new(region));
        }
        if let Some(endpoint) = settings.endpoint_url.as_deref() {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let client = Client::from_conf(
            aws_sdk_s3::config::Builder::from(&shared)
                .force_path_style(settings.endpoint_url.is_some())
                .build(),
        );

        Self::from_client(client, bucket)
    }

    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

fn missing_field(operation: &'static str, field: &str) -> StoreError {
    StoreError::backend(
        operation,
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("response carried no {}", field),
        ),
    )
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn initiate_multipart(&self, key: &str) -> StoreResult<String> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| StoreError::backend("CreateMultipartUpload", err))?;

        output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| missing_field("CreateMultipartUpload", "upload id"))
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StoreResult<String> {
        let content_length = body.len() as i64;
        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .content_length(content_length)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| StoreError::backend("UploadPart", err))?;

        debug!("uploaded part {} of {} ({} bytes)", part_number, key, content_length);
        output
            .e_tag()
            .map(str::to_string)
            .ok_or_else(|| missing_field("UploadPart", "etag"))
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartDescriptor],
    ) -> StoreResult<()> {
        let completed = parts
            .iter()
            .map(|part| {
                CompletedPart::builder()
                    .part_number(part.part_number)
                    .e_tag(&part.etag)
                    .build()
            })
            .collect::<Vec<_>>();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|err| StoreError::backend("CompleteMultipartUpload", err))?;
        Ok(())
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> StoreResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|err| StoreError::backend("AbortMultipartUpload", err))?;
        Ok(())
    }

    async fn put_object(&self, key: &str, content_length: u64, body: Bytes) -> StoreResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_length(content_length as i64)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| StoreError::backend("PutObject", err))?;
        Ok(())
    }

    async fn check_ready(&self) -> StoreResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|err| StoreError::backend("HeadBucket", err))?;
        Ok(())
    }
}
