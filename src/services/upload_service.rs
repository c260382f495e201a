//! UploadService: picks an upload strategy per file, drives it, and records
//! the content hash once the object is stored.

use crate::{
    models::{
        hash_record::HashRecord,
        upload::{ObjectKey, UploadRequest},
    },
    services::{
        hasher::{ContentDigest, IncrementalHasher},
        metadata_store::MetadataStore,
        multipart::{MultipartOutcome, upload_in_parts},
        object_store::ObjectStore,
        single_put::SinglePutUploader,
        upload_error::{UploadError, UploadResult},
    },
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{info, warn};

/// Default part size and single-put threshold (5 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Which path ended up writing the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStrategy {
    SinglePut,
    Multipart { parts: usize },
    /// Multipart was chosen but the content was smaller than declared.
    Fallback,
}

/// Result of a successful upload.
#[derive(Debug)]
pub struct UploadReceipt {
    pub key: ObjectKey,
    pub digest: ContentDigest,
    pub bytes_written: u64,
    pub strategy: UploadStrategy,
    pub uploaded_at: DateTime<Utc>,
}

/// Shared upload engine. Cloning is cheap; the store handles are shared and
/// every upload keeps its own session, buffers and hash state.
#[derive(Clone)]
pub struct UploadService {
    objects: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    chunk_size: usize,
}

impl UploadService {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        chunk_size: usize,
    ) -> Self {
        Self {
            objects,
            metadata,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn object_store(&self) -> &dyn ObjectStore {
        self.objects.as_ref()
    }

    pub fn metadata_store(&self) -> &dyn MetadataStore {
        self.metadata.as_ref()
    }

    /// Files declared smaller than one chunk are written with a single put.
    pub fn is_small(&self, declared_size: u64) -> bool {
        declared_size < self.chunk_size as u64
    }

    /// Store `request.content` and record its SHA-256.
    ///
    /// The strategy is chosen from the declared size before anything is read.
    /// The hash record is written only after the object write fully succeeded;
    /// if recording fails the object stays in place and `Metadata` is returned.
    pub async fn upload<R>(&self, request: UploadRequest<R>) -> UploadResult<UploadReceipt>
    where
        R: AsyncRead + Unpin + Send,
    {
        let UploadRequest {
            file_name,
            declared_size,
            mut content,
        } = request;

        if declared_size == 0 {
            return Err(UploadError::EmptyInput);
        }

        let uploaded_at = Utc::now();
        let key = ObjectKey::derive(&file_name, uploaded_at);
        let hasher = IncrementalHasher::new();
        let store = self.objects.as_ref();

        let (bytes_written, digest, strategy) = if self.is_small(declared_size) {
            info!("{}: single put for {} declared bytes", key, declared_size);
            let outcome = SinglePutUploader::new(store, self.chunk_size as u64)
                .put_whole(&key, declared_size, &mut content, hasher)
                .await?;
            (outcome.bytes_written, outcome.digest, UploadStrategy::SinglePut)
        } else {
            info!("{}: multipart upload for {} declared bytes", key, declared_size);
            match upload_in_parts(store, &key, self.chunk_size, &mut content, hasher).await? {
                MultipartOutcome::Completed {
                    parts,
                    bytes_written,
                    digest,
                } => (bytes_written, digest, UploadStrategy::Multipart { parts }),
                MultipartOutcome::FellBack {
                    bytes_written,
                    digest,
                } => (bytes_written, digest, UploadStrategy::Fallback),
            }
        };
        drop(content);

        let record = HashRecord::new(&file_name, digest.to_hyphenated_hex(), uploaded_at);
        if let Err(source) = self.metadata.put_record(&record).await {
            warn!(
                "{}: object stored but hash record for `{}` was not written",
                key, file_name
            );
            return Err(UploadError::Metadata { file_name, source });
        }

        info!(
            "{}: stored {} bytes via {:?}, sha256 {}",
            key, bytes_written, strategy, record.hash
        );
        Ok(UploadReceipt {
            key,
            digest,
            bytes_written,
            strategy,
            uploaded_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        metadata_store::MetadataError,
        testing::{Call, RecordingMetadataStore, RecordingObjectStore, sha256},
    };

    const KIB: usize = 1024;

    fn service(
        objects: &Arc<RecordingObjectStore>,
        metadata: &Arc<RecordingMetadataStore>,
        chunk_size: usize,
    ) -> UploadService {
        UploadService::new(objects.clone(), metadata.clone(), chunk_size)
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 256) as u8).collect()
    }

    #[test]
    fn threshold_uses_declared_size() {
        let service = UploadService::new(
            Arc::new(RecordingObjectStore::new()),
            Arc::new(RecordingMetadataStore::new()),
            DEFAULT_CHUNK_SIZE,
        );
        assert!(service.is_small(516 * 1024));
        assert!(!service.is_small(10 * 1024 * 1024));
        assert!(!service.is_small(DEFAULT_CHUNK_SIZE as u64));
    }

    #[tokio::test]
    async fn small_file_is_put_once_and_recorded() {
        let objects = Arc::new(RecordingObjectStore::new());
        let metadata = Arc::new(RecordingMetadataStore::new());
        let data = vec![0u8; 128 * KIB];

        let receipt = service(&objects, &metadata, DEFAULT_CHUNK_SIZE)
            .upload(UploadRequest::new(
                "photo.raw.jpg",
                data.len() as u64,
                data.as_slice(),
            ))
            .await
            .unwrap();

        assert_eq!(receipt.strategy, UploadStrategy::SinglePut);
        assert!(receipt.key.as_str().starts_with("photo/"));
        assert!(receipt.key.as_str().ends_with(".raw.jpg"));
        assert_eq!(objects.count(|c| matches!(c, Call::PutObject { .. })), 1);
        assert_eq!(objects.calls().len(), 1);

        let records = metadata.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].filename, "photo.raw.jpg");
        assert_eq!(records[0].uploaded_at, receipt.uploaded_at);
        assert_eq!(records[0].hash, receipt.digest.to_hyphenated_hex());
        assert_eq!(receipt.digest.as_bytes(), &sha256(&data));
    }

    #[tokio::test]
    async fn large_file_goes_through_parts() {
        let objects = Arc::new(RecordingObjectStore::new());
        let metadata = Arc::new(RecordingMetadataStore::new());
        let data = pattern(10 * KIB + 1);

        let receipt = service(&objects, &metadata, 4 * KIB)
            .upload(UploadRequest::new("big.bin", data.len() as u64, data.as_slice()))
            .await
            .unwrap();

        assert_eq!(receipt.strategy, UploadStrategy::Multipart { parts: 3 });
        assert_eq!(receipt.bytes_written, data.len() as u64);
        assert_eq!(objects.object(receipt.key.as_str()).unwrap(), data);
        assert_eq!(metadata.records().len(), 1);
    }

    #[tokio::test]
    async fn overstated_size_falls_back_to_single_put() {
        let objects = Arc::new(RecordingObjectStore::new());
        let metadata = Arc::new(RecordingMetadataStore::new());
        let data = pattern(KIB);

        let receipt = service(&objects, &metadata, 4 * KIB)
            .upload(UploadRequest::new("form.txt", 64 * KIB as u64, data.as_slice()))
            .await
            .unwrap();

        assert_eq!(receipt.strategy, UploadStrategy::Fallback);
        let calls = objects.calls();
        assert!(matches!(calls[0], Call::InitiateMultipart { .. }));
        assert!(matches!(calls[1], Call::AbortMultipart { .. }));
        assert_eq!(
            calls[2],
            Call::PutObject {
                key: receipt.key.to_string(),
                content_length: KIB as u64,
            }
        );
        assert_eq!(calls.len(), 3);
    }

    #[tokio::test]
    async fn digest_is_the_same_on_every_path() {
        let data = pattern(9 * KIB);
        let mut digests = Vec::new();

        // single put, multipart, fallback
        let runs = [
            (1u64, 16 * KIB, &data[..]),
            (data.len() as u64, 4 * KIB, &data[..]),
            (1 << 40, 4 * KIB, &data[..3 * KIB]),
        ];
        for (declared, chunk, content) in runs {
            let objects = Arc::new(RecordingObjectStore::new());
            let metadata = Arc::new(RecordingMetadataStore::new());
            let receipt = service(&objects, &metadata, chunk)
                .upload(UploadRequest::new("same.bin", declared, content))
                .await
                .unwrap();
            digests.push((receipt.strategy, receipt.digest, content.len()));
        }

        assert_eq!(digests[0].0, UploadStrategy::SinglePut);
        assert_eq!(digests[1].0, UploadStrategy::Multipart { parts: 3 });
        assert_eq!(digests[2].0, UploadStrategy::Fallback);
        assert_eq!(digests[0].1, digests[1].1);
        assert_eq!(digests[2].1.as_bytes(), &sha256(&data[..digests[2].2]));
    }

    #[tokio::test]
    async fn understated_size_cannot_grow_past_one_chunk() {
        let objects = Arc::new(RecordingObjectStore::new());
        let metadata = Arc::new(RecordingMetadataStore::new());
        let data = pattern(12 * KIB);

        let err = service(&objects, &metadata, 4 * KIB)
            .upload(UploadRequest::new("liar.bin", 100, data.as_slice()))
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::SizeExceeded { limit } if limit == 4 * KIB as u64));
        assert!(objects.calls().is_empty());
        assert!(metadata.records().is_empty());
    }

    #[tokio::test]
    async fn zero_declared_size_is_rejected_before_the_store() {
        let objects = Arc::new(RecordingObjectStore::new());
        let metadata = Arc::new(RecordingMetadataStore::new());

        let err = service(&objects, &metadata, DEFAULT_CHUNK_SIZE)
            .upload(UploadRequest::new("empty.txt", 0, &b"ignored"[..]))
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::EmptyInput));
        assert!(objects.calls().is_empty());
        assert!(metadata.records().is_empty());
    }

    #[tokio::test]
    async fn part_failure_records_nothing() {
        let objects = Arc::new(RecordingObjectStore::new().fail_part(2));
        let metadata = Arc::new(RecordingMetadataStore::new());
        let data = pattern(10 * KIB);

        let err = service(&objects, &metadata, 5 * KIB)
            .upload(UploadRequest::new("ten.bin", data.len() as u64, data.as_slice()))
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Store { .. }));
        assert_eq!(objects.count(|c| matches!(c, Call::AbortMultipart { .. })), 1);
        assert_eq!(objects.count(|c| matches!(c, Call::CompleteMultipart { .. })), 0);
        assert!(metadata.records().is_empty());
    }

    #[tokio::test]
    async fn metadata_failure_keeps_the_object() {
        let objects = Arc::new(RecordingObjectStore::new());
        let metadata = Arc::new(RecordingMetadataStore::failing());

        let err = service(&objects, &metadata, DEFAULT_CHUNK_SIZE)
            .upload(UploadRequest::new("orphan.txt", 5, &b"hello"[..]))
            .await
            .unwrap_err();

        match err {
            UploadError::Metadata { file_name, source } => {
                assert_eq!(file_name, "orphan.txt");
                assert!(matches!(source, MetadataError::Sqlx(_)));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(objects.count(|c| matches!(c, Call::PutObject { .. })), 1);
    }
}
