//! Request/response logging middleware.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::info;

/// Log every request and the response status with its latency.
///
/// Bodies are never logged; uploads can be gigabytes.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    info!("Request: {} {}", method, uri);

    let response = next.run(request).await;

    info!(
        "Response: {} {} -> {} in {}ms",
        method,
        uri,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}
