//! Multipart upload session state and committed parts.

use std::fmt;

/// Lifecycle of a multipart upload session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    /// Created locally, no upload id issued yet.
    Uninitiated,

    /// Upload id issued; parts may be added.
    Active,

    /// Store assembled the parts into the final object.
    Completed,

    /// Store discarded the session and its parts.
    Aborted,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Uninitiated => "uninitiated",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

/// A part acknowledged by the object store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartDescriptor {
    /// Part number (1-based).
    pub part_number: i32,

    /// Size in bytes.
    pub size_bytes: u64,

    /// ETag returned by the store for this part.
    pub etag: String,
}
