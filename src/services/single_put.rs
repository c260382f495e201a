//! One-shot upload: buffer the whole stream, then write it with a single
//! `put_object` call.

use crate::{
    models::upload::ObjectKey,
    services::{
        hasher::{ContentDigest, IncrementalHasher},
        object_store::ObjectStore,
        upload_error::{StoreOperation, UploadError, UploadResult},
    },
};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

const READ_BLOCK: usize = 64 * 1024;
const MAX_PREALLOC: u64 = 8 * 1024 * 1024;

/// What a successful single put wrote.
#[derive(Debug)]
pub struct PutOutcome {
    pub bytes_written: u64,
    pub digest: ContentDigest,
}

/// Buffers a whole stream and writes it with one `put_object`.
///
/// At most `max_bytes` are buffered; longer content fails with
/// [`UploadError::SizeExceeded`] before anything reaches the store.
pub struct SinglePutUploader<'a> {
    store: &'a dyn ObjectStore,
    max_bytes: u64,
}

impl<'a> SinglePutUploader<'a> {
    pub fn new(store: &'a dyn ObjectStore, max_bytes: u64) -> Self {
        Self { store, max_bytes }
    }

    /// Read `content` to the end, hashing every range as it arrives, then
    /// write it as one object.
    ///
    /// The content length sent to the store is the number of bytes actually
    /// read, not `declared_size`. The digest is finalized only once the store
    /// acknowledged the write.
    pub async fn put_whole<R>(
        &self,
        key: &ObjectKey,
        declared_size: u64,
        content: &mut R,
        mut hasher: IncrementalHasher,
    ) -> UploadResult<PutOutcome>
    where
        R: AsyncRead + Unpin,
    {
        let prealloc = declared_size.min(self.max_bytes).min(MAX_PREALLOC);
        let mut body = BytesMut::with_capacity(prealloc as usize);
        // One byte past the ceiling is enough to tell that it was crossed.
        let mut limited = (&mut *content).take(self.max_bytes.saturating_add(1));
        loop {
            if body.capacity() - body.len() < READ_BLOCK {
                body.reserve(READ_BLOCK);
            }
            let start = body.len();
            let read = limited
                .read_buf(&mut body)
                .await
                .map_err(UploadError::read)?;
            if read == 0 {
                break;
            }
            if body.len() as u64 > self.max_bytes {
                return Err(UploadError::SizeExceeded {
                    limit: self.max_bytes,
                });
            }
            hasher.feed(&body[start..]);
        }

        if body.is_empty() {
            return Err(UploadError::EmptyInput);
        }

        let bytes_written = body.len() as u64;
        if bytes_written != declared_size {
            debug!(
                "{}: declared {} bytes, read {}",
                key, declared_size, bytes_written
            );
        }

        self.store
            .put_object(key.as_str(), bytes_written, body.freeze())
            .await
            .map_err(|err| UploadError::store(StoreOperation::PutObject, err))?;

        Ok(PutOutcome {
            bytes_written,
            digest: hasher.finalize(),
        })
    }
}
