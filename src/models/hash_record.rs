//! Content hash recorded for every completed upload.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::FromRow;

/// Provenance row written once an object is durably stored.
///
/// Records are insert-only; nothing in this service updates or deletes them.
#[derive(Clone, FromRow, Debug, PartialEq, Eq)]
pub struct HashRecord {
    /// File name as supplied by the client.
    pub filename: String,

    /// SHA-256 digest as uppercase hyphen-separated hex.
    pub hash: String,

    /// When the upload started.
    pub uploaded_at: DateTime<Utc>,
}

impl HashRecord {
    pub fn new(
        filename: impl Into<String>,
        hash: impl Into<String>,
        uploaded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            filename: filename.into(),
            hash: hash.into(),
            uploaded_at,
        }
    }

    /// ISO-8601 rendering stored alongside the hash.
    pub fn uploaded_at_iso(&self) -> String {
        self.uploaded_at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}
