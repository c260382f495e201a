//! Inbound upload requests and the object keys derived from them.

use chrono::{DateTime, Utc};
use std::fmt;

/// Timestamp layout used inside object keys (`yyyyMMddTHHmmss`, UTC).
const KEY_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

/// A single file to be persisted.
///
/// `content` is read exactly once, front to back. The declared size is
/// advisory: it picks the upload strategy but the bytes actually read decide
/// what is written. A file declared smaller than one chunk is buffered in
/// memory and must not grow past one chunk; longer content is refused with
/// `UploadError::SizeExceeded`.
pub struct UploadRequest<R> {
    /// Name supplied by the client, recorded verbatim with the hash.
    pub file_name: String,

    /// Size the caller expects the content to have.
    pub declared_size: u64,

    /// Forward-only byte source.
    pub content: R,
}

impl<R> UploadRequest<R> {
    pub fn new(file_name: impl Into<String>, declared_size: u64, content: R) -> Self {
        Self {
            file_name: file_name.into(),
            declared_size,
            content,
        }
    }
}

/// Object-store key for one upload: `{basename}/{timestamp}.{extensions}`.
///
/// The name is split on `.`; the first segment is the basename and the rest
/// are joined back as the extension. Two uploads of the same name in the same
/// second map to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Derive the key for `file_name` uploaded at `started_at`.
    pub fn derive(file_name: &str, started_at: DateTime<Utc>) -> Self {
        let mut segments = file_name.split('.');
        let basename = segments.next().unwrap_or_default();
        let extension = segments.collect::<Vec<_>>().join(".");

        Self(format!(
            "{}/{}.{}",
            basename,
            started_at.format(KEY_TIMESTAMP_FORMAT),
            extension
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
