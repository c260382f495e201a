use crate::services::upload_error::UploadError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::{error::Error as _, fmt};

/// Message returned for every failure inside the upload engine.
pub const UPLOAD_FAILED: &str = "File upload failed.";

/// Message returned when the request carried no file content.
pub const NO_FILE: &str = "No file uploaded.";

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

/// Empty content is the client's problem; everything else collapses into a
/// generic 500 with the full cause chain kept in the logs only.
impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        if matches!(err, UploadError::EmptyInput) {
            return AppError::bad_request(NO_FILE);
        }

        let mut chain = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push_str(": ");
            chain.push_str(&cause.to_string());
            source = cause.source();
        }
        match err.abort_failure() {
            Some(abort) => tracing::error!("{} (abort also failed: {})", chain, abort),
            None => tracing::error!("{}", chain),
        }

        AppError::internal(UPLOAD_FAILED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        object_store::StoreError,
        upload_error::StoreOperation,
    };

    #[test]
    fn empty_input_is_a_client_error() {
        let err = AppError::from(UploadError::EmptyInput);
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, NO_FILE);
    }

    #[test]
    fn store_errors_do_not_leak_details() {
        let err = AppError::from(UploadError::store(
            StoreOperation::PutObject,
            StoreError::InvalidKey("secret/internal/key".into()),
        ));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, UPLOAD_FAILED);
        assert!(!err.to_string().contains("secret"));
    }
}
