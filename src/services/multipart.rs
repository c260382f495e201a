//! Chunked uploads through an object-store multipart session.
//!
//! [`MultipartSession`] is the per-upload state machine
//! (`Uninitiated -> Active -> Completed | Aborted`). [`upload_in_parts`] drives
//! it: it reads fixed-size chunks, uploads them in order, hashes what the
//! store acknowledged, and cleans the session up on any failure.

use crate::{
    models::{
        multipart::{PartDescriptor, SessionStatus},
        upload::ObjectKey,
    },
    services::{
        hasher::{ContentDigest, IncrementalHasher},
        object_store::ObjectStore,
        single_put::SinglePutUploader,
        upload_error::{StoreOperation, UploadError, UploadResult},
    },
};
use bytes::{Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

/// A multipart upload owned by a single upload call.
pub struct MultipartSession<'a> {
    store: &'a dyn ObjectStore,
    key: &'a ObjectKey,
    upload_id: Option<String>,
    parts: Vec<PartDescriptor>,
    next_part_number: i32,
    status: SessionStatus,
}

impl<'a> MultipartSession<'a> {
    pub fn new(store: &'a dyn ObjectStore, key: &'a ObjectKey) -> Self {
        Self {
            store,
            key,
            upload_id: None,
            parts: Vec::new(),
            next_part_number: 1,
            status: SessionStatus::Uninitiated,
        }
    }

    pub fn parts(&self) -> &[PartDescriptor] {
        &self.parts
    }

    fn invalid(&self, operation: &'static str) -> UploadError {
        UploadError::InvalidSessionState {
            operation,
            status: self.status,
        }
    }

    /// Upload id of an active session.
    fn active_upload_id(&self, operation: &'static str) -> UploadResult<&str> {
        match (self.status, self.upload_id.as_deref()) {
            (SessionStatus::Active, Some(upload_id)) => Ok(upload_id),
            _ => Err(self.invalid(operation)),
        }
    }

    /// Ask the store for an upload id. Nothing exists store-side if this fails.
    pub async fn begin(&mut self) -> UploadResult<()> {
        if self.status != SessionStatus::Uninitiated {
            return Err(self.invalid("begin"));
        }
        let upload_id = self
            .store
            .initiate_multipart(self.key.as_str())
            .await
            .map_err(|err| UploadError::store(StoreOperation::InitiateMultipart, err))?;

        debug!("{}: multipart upload {} started", self.key, upload_id);
        self.upload_id = Some(upload_id);
        self.status = SessionStatus::Active;
        Ok(())
    }

    /// Upload `chunk` as the next part and record its descriptor.
    pub async fn upload_part(&mut self, chunk: Bytes) -> UploadResult<()> {
        let upload_id = self.active_upload_id("upload a part to")?;
        let part_number = self.next_part_number;
        let size_bytes = chunk.len() as u64;

        let etag = self
            .store
            .upload_part(self.key.as_str(), upload_id, part_number, chunk)
            .await
            .map_err(|err| UploadError::store(StoreOperation::UploadPart { part_number }, err))?;

        debug!(
            "{}: part {} stored ({} bytes)",
            self.key, part_number, size_bytes
        );
        self.parts.push(PartDescriptor {
            part_number,
            size_bytes,
            etag,
        });
        self.next_part_number += 1;
        Ok(())
    }

    /// Assemble the committed parts into the final object.
    ///
    /// Completing without parts is a caller bug and never reaches the store.
    pub async fn complete(&mut self) -> UploadResult<()> {
        let upload_id = self.active_upload_id("complete")?;
        if self.parts.is_empty() {
            return Err(UploadError::EmptySession {
                key: self.key.to_string(),
            });
        }

        self.store
            .complete_multipart(self.key.as_str(), upload_id, &self.parts)
            .await
            .map_err(|err| UploadError::store(StoreOperation::CompleteMultipart, err))?;

        self.status = SessionStatus::Completed;
        Ok(())
    }

    /// Discard the session store-side. Must be called at most once; a second
    /// call is rejected locally.
    pub async fn abort(&mut self) -> UploadResult<()> {
        let upload_id = self.active_upload_id("abort")?;
        let result = self
            .store
            .abort_multipart(self.key.as_str(), upload_id)
            .await;

        // The session is unusable either way; never abort it twice.
        self.status = SessionStatus::Aborted;
        result.map_err(|err| UploadError::store(StoreOperation::AbortMultipart, err))
    }

    /// Abort after `cause` and return `cause`, carrying the abort's own error
    /// as a secondary failure if it also failed.
    async fn abort_after(&mut self, cause: UploadError) -> UploadError {
        warn!("{}: aborting multipart upload after error: {}", self.key, cause);
        match self.abort().await {
            Ok(()) => cause,
            Err(UploadError::Store { source, .. }) => {
                warn!("{}: abort failed as well: {}", self.key, source);
                cause.with_abort_failure(source)
            }
            Err(other) => {
                warn!("{}: abort skipped: {}", self.key, other);
                cause
            }
        }
    }
}

/// How a multipart-selected upload ended up being written.
#[derive(Debug)]
pub enum MultipartOutcome {
    /// Every chunk went through the session.
    Completed {
        parts: usize,
        bytes_written: u64,
        digest: ContentDigest,
    },

    /// The first chunk was short, so the session was aborted and the bytes
    /// were written with a single put instead.
    FellBack {
        bytes_written: u64,
        digest: ContentDigest,
    },
}

/// Fill `buffer` with up to `chunk_size` bytes, stopping early only at end of
/// stream. Returns the number of bytes buffered.
async fn fill_chunk<R>(
    reader: &mut R,
    buffer: &mut BytesMut,
    chunk_size: usize,
) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    buffer.clear();
    buffer.reserve(chunk_size);
    while buffer.len() < chunk_size {
        let remaining = (chunk_size - buffer.len()) as u64;
        let read = (&mut *reader).take(remaining).read_buf(buffer).await?;
        if read == 0 {
            break;
        }
    }
    Ok(buffer.len())
}

/// Upload `content` in `chunk_size` parts.
///
/// Parts are hashed after the store acknowledged them, in part order, and the
/// digest is finalized only after the session completes. Any failure after
/// `begin` aborts the session exactly once before the error is returned.
///
/// If the first chunk turns out shorter than `chunk_size`, the file is smaller
/// than its declared size suggested: the session is aborted first and the
/// buffered bytes are written with a single put.
pub async fn upload_in_parts<R>(
    store: &dyn ObjectStore,
    key: &ObjectKey,
    chunk_size: usize,
    content: &mut R,
    mut hasher: IncrementalHasher,
) -> UploadResult<MultipartOutcome>
where
    R: AsyncRead + Unpin,
{
    let mut session = MultipartSession::new(store, key);
    session.begin().await?;

    let mut buffer = BytesMut::with_capacity(chunk_size);
    let mut bytes_written: u64 = 0;
    loop {
        let read = match fill_chunk(content, &mut buffer, chunk_size).await {
            Ok(read) => read,
            Err(err) => return Err(session.abort_after(UploadError::read(err)).await),
        };

        if session.parts().is_empty() && read < chunk_size {
            session.abort().await?;
            if read == 0 {
                return Err(UploadError::EmptyInput);
            }
            info!(
                "{}: first chunk holds only {} bytes, switching to single put",
                key, read
            );
            let buffered = buffer.split().freeze();
            let mut replay = (&buffered[..]).chain(content);
            let outcome = SinglePutUploader::new(store, chunk_size as u64)
                .put_whole(key, read as u64, &mut replay, hasher)
                .await?;
            return Ok(MultipartOutcome::FellBack {
                bytes_written: outcome.bytes_written,
                digest: outcome.digest,
            });
        }

        if read == 0 {
            break;
        }

        let chunk = buffer.split().freeze();
        if let Err(err) = session.upload_part(chunk.clone()).await {
            return Err(session.abort_after(err).await);
        }
        hasher.feed(&chunk);
        bytes_written += read as u64;

        if read < chunk_size {
            break;
        }
    }

    if let Err(err) = session.complete().await {
        return Err(session.abort_after(err).await);
    }

    let parts = session.parts().len();
    info!(
        "{}: multipart upload completed with {} parts ({} bytes)",
        key, parts, bytes_written
    );
    Ok(MultipartOutcome::Completed {
        parts,
        bytes_written,
        digest: hasher.finalize(),
    })
}
