//! src/services/fs_store.rs
//!
//! FsObjectStore: an S3-shaped object store on local disk. Objects are
//! sharded beneath `base_path/{bucket}/{shard}/{shard}/{key}`; multipart parts
//! are staged beneath `base_path/{bucket}/.multipart/{upload_id}/` until the
//! upload is completed or aborted.

use crate::{
    models::multipart::PartDescriptor,
    services::object_store::{ObjectStore, StoreError, StoreResult},
};
use async_trait::async_trait;
use bytes::Bytes;
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const STAGING_DIR: &str = ".multipart";
const COPY_BUFFER_LEN: usize = 64 * 1024;

#[derive(Clone, Debug)]
pub struct FsObjectStore {
    /// Base directory on disk where buckets live.
    base_path: PathBuf,

    /// Bucket every key is written into.
    bucket: String,
}

impl FsObjectStore {
    pub fn new(base_path: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            bucket: bucket.into(),
        }
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    ///
    /// Empty segments are allowed (a dotfile upload yields `/{timestamp}.env`)
    /// and are dropped when the key is mapped onto disk.
    fn ensure_key_safe(key: &str) -> StoreResult<()> {
        let invalid = key.len() > MAX_OBJECT_KEY_LEN
            || matches!(key_segments(key).next(), None | Some(STAGING_DIR))
            || key_segments(key).any(|segment| segment == ".." || segment == ".")
            || key
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
        if invalid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    /// Upload ids are generated here; anything else never names a staging dir.
    fn ensure_upload_id(upload_id: &str) -> StoreResult<()> {
        Uuid::parse_str(upload_id)
            .map(|_| ())
            .map_err(|_| StoreError::UploadNotFound(upload_id.to_string()))
    }

    fn bucket_root(&self) -> PathBuf {
        self.base_path.join(&self.bucket)
    }

    /// Two-level shard identifiers from MD5(bucket/key), as lowercase hex.
    fn object_shards(bucket: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Payload path for `key`. Parent directories may not exist yet.
    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(&self.bucket, key);
        let mut path = self.bucket_root();
        path.push(shard_a);
        path.push(shard_b);
        path.extend(key_segments(key));
        path
    }

    fn staging_dir(&self, upload_id: &str) -> PathBuf {
        self.bucket_root().join(STAGING_DIR).join(upload_id)
    }

    fn part_path(&self, upload_id: &str, part_number: i32) -> PathBuf {
        self.staging_dir(upload_id)
            .join(format!("part-{:05}", part_number))
    }

    async fn ensure_upload_exists(&self, upload_id: &str) -> StoreResult<()> {
        Self::ensure_upload_id(upload_id)?;
        match fs::metadata(self.staging_dir(upload_id)).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(StoreError::UploadNotFound(upload_id.to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StoreError::UploadNotFound(upload_id.to_string()))
            }
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    /// Write `body` to a temp file beside `final_path`, fsync, and rename into
    /// place. The temp file is removed on any failure.
    async fn write_atomically(&self, final_path: &Path, body: &[u8]) -> StoreResult<()> {
        let tmp_path = temp_path_beside(final_path).await?;
        if let Err(err) = write_file(&tmp_path, body).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        if let Err(err) = replace_file(&tmp_path, final_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        Ok(())
    }

    /// Concatenate staged parts into the final object.
    async fn assemble(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartDescriptor],
    ) -> StoreResult<()> {
        let final_path = self.object_path(key);
        let tmp_path = temp_path_beside(&final_path).await?;
        if let Err(err) = self.copy_parts(&tmp_path, upload_id, parts).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }
        if let Err(err) = replace_file(&tmp_path, &final_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        Ok(())
    }

    /// Copy every part into `tmp_path`, verifying each ETag as it streams by.
    async fn copy_parts(
        &self,
        tmp_path: &Path,
        upload_id: &str,
        parts: &[PartDescriptor],
    ) -> StoreResult<()> {
        let mut out = File::create(tmp_path).await?;
        let mut buffer = vec![0u8; COPY_BUFFER_LEN];
        for part in parts {
            let mut source = File::open(self.part_path(upload_id, part.part_number))
                .await
                .map_err(|err| match err.kind() {
                    ErrorKind::NotFound => StoreError::InvalidParts {
                        upload_id: upload_id.to_string(),
                        reason: format!("part {} was never uploaded", part.part_number),
                    },
                    _ => StoreError::Io(err),
                })?;
            let mut digest = Context::new();
            loop {
                let read = source.read(&mut buffer).await?;
                if read == 0 {
                    break;
                }
                digest.consume(&buffer[..read]);
                out.write_all(&buffer[..read]).await?;
            }
            if format!("{:x}", digest.compute()) != part.etag {
                return Err(StoreError::InvalidParts {
                    upload_id: upload_id.to_string(),
                    reason: format!("etag mismatch for part {}", part.part_number),
                });
            }
        }
        out.flush().await?;
        out.sync_all().await?;
        Ok(())
    }

    async fn remove_staging(&self, upload_id: &str) {
        let dir = self.staging_dir(upload_id);
        if let Err(err) = fs::remove_dir_all(&dir).await {
            if err.kind() != ErrorKind::NotFound {
                debug!(
                    "failed to remove staging directory {}: {}",
                    dir.display(),
                    err
                );
            }
        }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn initiate_multipart(&self, key: &str) -> StoreResult<String> {
        Self::ensure_key_safe(key)?;
        let upload_id = Uuid::new_v4().to_string();
        fs::create_dir_all(self.staging_dir(&upload_id)).await?;
        debug!("initiated multipart upload {} for {}", upload_id, key);
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StoreResult<String> {
        Self::ensure_key_safe(key)?;
        if part_number < 1 {
            return Err(StoreError::InvalidParts {
                upload_id: upload_id.to_string(),
                reason: format!("part number {} is not positive", part_number),
            });
        }
        self.ensure_upload_exists(upload_id).await?;

        let etag = format!("{:x}", md5::compute(&body));
        self.write_atomically(&self.part_path(upload_id, part_number), &body)
            .await?;
        Ok(etag)
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartDescriptor],
    ) -> StoreResult<()> {
        Self::ensure_key_safe(key)?;
        self.ensure_upload_exists(upload_id).await?;
        if parts.is_empty() {
            return Err(StoreError::InvalidParts {
                upload_id: upload_id.to_string(),
                reason: "no parts supplied".into(),
            });
        }
        if let Some((index, part)) = parts
            .iter()
            .enumerate()
            .find(|(index, part)| part.part_number != *index as i32 + 1)
        {
            return Err(StoreError::InvalidParts {
                upload_id: upload_id.to_string(),
                reason: format!(
                    "expected part {} at position {}, got {}",
                    index + 1,
                    index,
                    part.part_number
                ),
            });
        }

        self.assemble(key, upload_id, parts).await?;
        self.remove_staging(upload_id).await;
        Ok(())
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> StoreResult<()> {
        Self::ensure_key_safe(key)?;
        self.ensure_upload_exists(upload_id).await?;
        fs::remove_dir_all(self.staging_dir(upload_id)).await?;
        debug!("aborted multipart upload {} for {}", upload_id, key);
        Ok(())
    }

    async fn put_object(&self, key: &str, content_length: u64, body: Bytes) -> StoreResult<()> {
        Self::ensure_key_safe(key)?;
        if body.len() as u64 != content_length {
            return Err(StoreError::Io(io::Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "content length {} does not match body of {} bytes",
                    content_length,
                    body.len()
                ),
            )));
        }
        self.write_atomically(&self.object_path(key), &body).await
    }

    /// Write/read/delete a probe file beneath the bucket root.
    async fn check_ready(&self) -> StoreResult<()> {
        let root = self.bucket_root();
        fs::create_dir_all(&root).await?;
        let probe = root.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&probe, b"readyz").await?;
        let read_back = fs::read(&probe).await;
        let _ = fs::remove_file(&probe).await;
        if read_back? != b"readyz" {
            return Err(StoreError::Io(io::Error::new(
                ErrorKind::Other,
                "probe file content mismatch",
            )));
        }
        Ok(())
    }
}

/// Non-empty `/`-separated segments of `key`, so the key always maps to a
/// relative path.
fn key_segments(key: &str) -> impl Iterator<Item = &str> {
    key.split('/').filter(|segment| !segment.is_empty())
}

/// Fresh `.tmp-*` path in the (created) parent directory of `final_path`.
async fn temp_path_beside(final_path: &Path) -> StoreResult<PathBuf> {
    let parent = final_path.parent().map(Path::to_path_buf).ok_or_else(|| {
        StoreError::Io(io::Error::new(
            ErrorKind::Other,
            "object path missing parent directory",
        ))
    })?;
    fs::create_dir_all(&parent).await?;
    Ok(parent.join(format!(".tmp-{}", Uuid::new_v4())))
}

async fn write_file(path: &Path, body: &[u8]) -> io::Result<()> {
    let mut file = File::create(path).await?;
    file.write_all(body).await?;
    file.flush().await?;
    file.sync_all().await
}

/// Rename `from` over `to`, replacing an existing file.
async fn replace_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to).await {
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            fs::remove_file(to).await?;
            fs::rename(from, to).await
        }
        other => other,
    }
}
