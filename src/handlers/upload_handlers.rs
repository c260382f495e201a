//! HTTP handler for file uploads.
//! Streams the `file` form field straight into `UploadService` without
//! buffering the request body.

use crate::{
    errors::{AppError, NO_FILE},
    models::upload::UploadRequest,
    services::upload_service::UploadService,
};
use axum::{
    extract::{Multipart, State, multipart::MultipartError},
    http::{HeaderMap, StatusCode, header},
};
use bytes::Bytes;
use futures::{StreamExt, stream};
use std::io;
use tokio_util::io::StreamReader;
use tracing::info;

/// Form field carrying the file.
const FILE_FIELD: &str = "file";

/// Declared size of the upload, taken from `Content-Length`.
///
/// The header covers the whole form, so it over-states the file by the form
/// overhead. A missing or unreadable header is treated as "large" and the
/// multipart path's short-first-chunk fallback decides instead.
fn declared_size(headers: &HeaderMap) -> u64 {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(u64::MAX)
}

fn multipart_rejection(err: MultipartError) -> AppError {
    AppError::new(err.status(), err.body_text())
}

/// `POST /files`: store one file and record its hash.
///
/// Returns 200 with an empty body on success, 400 when no file content was
/// sent, and a generic 500 for any storage failure.
pub async fn upload_file(
    State(service): State<UploadService>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<StatusCode, AppError> {
    let declared_size = declared_size(&headers);

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_rejection)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field
            .file_name()
            .filter(|name| !name.is_empty())
            .unwrap_or(FILE_FIELD)
            .to_string();

        // Skip leading empty frames so an empty file is rejected up front.
        let first = loop {
            match field.chunk().await.map_err(multipart_rejection)? {
                Some(chunk) if chunk.is_empty() => continue,
                other => break other,
            }
        };
        let Some(first) = first else {
            return Err(AppError::bad_request(NO_FILE));
        };

        info!("receiving `{}` ({} bytes declared)", file_name, declared_size);
        let body = stream::iter([Ok::<Bytes, MultipartError>(first)])
            .chain(field)
            .map(|chunk| chunk.map_err(|err| io::Error::new(io::ErrorKind::Other, err)))
            .boxed();
        let content = StreamReader::new(body);

        let receipt = service
            .upload(UploadRequest::new(file_name, declared_size, content))
            .await?;
        info!(
            "stored {} ({} bytes, {:?}) at {}, sha256 {}",
            receipt.key,
            receipt.bytes_written,
            receipt.strategy,
            receipt.uploaded_at.to_rfc3339(),
            receipt.digest
        );
        return Ok(StatusCode::OK);
    }

    Err(AppError::bad_request(NO_FILE))
}
