//! Axum middleware attached in front of the gateway handler.
use std::time::Instant;

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

use crate::tracing_setup::create_request_span;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Run the request inside a `request` span and expose its id via
/// `X-Request-ID`. An id supplied by the caller is kept.
pub async fn request_span_middleware(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let header_value = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = &header_value {
        req.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
    }

    let span = create_request_span(req.method().as_str(), req.uri().path(), &request_id);
    let start = Instant::now();
    let mut response = next.run(req).instrument(span.clone()).await;

    let duration = start.elapsed();
    span.record("http.status_code", response.status().as_u16());
    span.record("duration_ms", duration.as_millis() as u64);
    span.in_scope(|| {
        tracing::info!(status = %response.status(), duration = ?duration, "Completed request");
    });

    if let Some(value) = header_value {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
