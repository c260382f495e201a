//! Defines routes for the file storage service.
//!
//! ## Structure
//! - `POST /files`   upload one file (multipart/form-data, field `file`)
//! - `GET  /healthz` liveness
//! - `GET  /readyz`  readiness of the object and metadata stores
//!
//! Every route is wrapped in request logging; the upload route additionally
//! carries the request body ceiling.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        request_log::log_requests,
        upload_handlers::upload_file,
    },
    services::upload_service::UploadService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};

/// Build and return the router.
///
/// The router carries shared state (`UploadService`) to all handlers.
/// `max_body_bytes` caps the whole upload request, form overhead included.
pub fn routes(max_body_bytes: usize) -> Router<UploadService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/files",
            post(upload_file).layer(DefaultBodyLimit::max(max_body_bytes)),
        )
        .layer(middleware::from_fn(log_requests))
}
