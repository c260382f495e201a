//! Errors raised while driving an upload through the object store.

use crate::{
    models::multipart::SessionStatus,
    services::{metadata_store::MetadataError, object_store::StoreError},
};
use std::{fmt, io};
use thiserror::Error;

/// Object-store call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    InitiateMultipart,
    UploadPart { part_number: i32 },
    CompleteMultipart,
    AbortMultipart,
    PutObject,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitiateMultipart => f.write_str("initiate multipart upload"),
            Self::UploadPart { part_number } => write!(f, "upload part {}", part_number),
            Self::CompleteMultipart => f.write_str("complete multipart upload"),
            Self::AbortMultipart => f.write_str("abort multipart upload"),
            Self::PutObject => f.write_str("put object"),
        }
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no bytes to upload")]
    EmptyInput,

    /// More bytes arrived than a single put may buffer.
    #[error("content exceeds the {limit} byte single-put limit")]
    SizeExceeded { limit: u64 },

    #[error("cannot {operation} a multipart session that is {status}")]
    InvalidSessionState {
        operation: &'static str,
        status: SessionStatus,
    },

    #[error("multipart upload for `{key}` has no parts to complete")]
    EmptySession { key: String },

    /// The inbound stream failed. `abort_failure` is set when cleaning up the
    /// multipart session afterwards failed as well.
    #[error("reading upload content failed")]
    Read {
        #[source]
        source: io::Error,
        abort_failure: Option<StoreError>,
    },

    /// An object-store call failed. `abort_failure` is set when cleaning up the
    /// multipart session afterwards failed as well.
    #[error("object store could not {operation}")]
    Store {
        operation: StoreOperation,
        #[source]
        source: StoreError,
        abort_failure: Option<StoreError>,
    },

    /// The object was written but its hash record was not.
    #[error("recording hash for `{file_name}` failed")]
    Metadata {
        file_name: String,
        #[source]
        source: MetadataError,
    },
}

impl UploadError {
    pub fn store(operation: StoreOperation, source: StoreError) -> Self {
        Self::Store {
            operation,
            source,
            abort_failure: None,
        }
    }

    pub fn read(source: io::Error) -> Self {
        Self::Read {
            source,
            abort_failure: None,
        }
    }

    /// Attach the error of a failed cleanup abort to this (primary) error.
    ///
    /// Only stream and store failures trigger an abort; any other variant is
    /// returned unchanged.
    pub fn with_abort_failure(self, failure: StoreError) -> Self {
        match self {
            Self::Read { source, .. } => Self::Read {
                source,
                abort_failure: Some(failure),
            },
            Self::Store {
                operation, source, ..
            } => Self::Store {
                operation,
                source,
                abort_failure: Some(failure),
            },
            other => other,
        }
    }

    /// Error from the cleanup abort that followed this error, if any.
    pub fn abort_failure(&self) -> Option<&StoreError> {
        match self {
            Self::Read { abort_failure, .. } | Self::Store { abort_failure, .. } => {
                abort_failure.as_ref()
            }
            _ => None,
        }
    }
}

pub type UploadResult<T> = Result<T, UploadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_failure_is_kept_beside_the_primary_error() {
        let primary = UploadError::store(
            StoreOperation::UploadPart { part_number: 2 },
            StoreError::UploadNotFound("u-1".into()),
        );
        let combined = primary.with_abort_failure(StoreError::InvalidKey("k".into()));

        match &combined {
            UploadError::Store {
                operation, source, ..
            } => {
                assert_eq!(*operation, StoreOperation::UploadPart { part_number: 2 });
                assert!(matches!(source, StoreError::UploadNotFound(_)));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(matches!(
            combined.abort_failure(),
            Some(StoreError::InvalidKey(_))
        ));
        assert_eq!(combined.to_string(), "object store could not upload part 2");
    }

    #[test]
    fn abort_failure_is_ignored_for_other_kinds() {
        let err = UploadError::EmptyInput.with_abort_failure(StoreError::InvalidKey("k".into()));
        assert!(matches!(err, UploadError::EmptyInput));
        assert!(err.abort_failure().is_none());
    }
}
