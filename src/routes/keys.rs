//! Key publication routes
//!
//! - `GET /keys` and `GET /.well-known/jwks.json` - public signing key in
//!   JWKS format, for relying parties verifying issued tokens
//!
//! `Last-Modified` is the key generation time, which stays fixed for the
//! life of the process, so conditional requests get a `304` until restart.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::Full;
use hyper::header::{
    ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_TYPE, LAST_MODIFIED,
};
use hyper::{Response, StatusCode};
use tracing::{debug, error};

use crate::server::AppState;

/// Format a timestamp as an IMF-fixdate (RFC 9110 HTTP-date)
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parse an HTTP-date header value
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// True when the client's copy is at least as new as the key
fn not_modified(if_modified_since: Option<&str>, generated_at: DateTime<Utc>) -> bool {
    if_modified_since
        .and_then(parse_http_date)
        .map(|since| since >= generated_at)
        .unwrap_or(false)
}

/// Handle GET /keys
///
/// Returns the key set store's marshaled snapshot. Nothing here mutates key
/// state; the first request on a cold manager triggers key generation.
pub async fn handle_keys(
    state: Arc<AppState>,
    if_modified_since: Option<&str>,
) -> Response<Full<Bytes>> {
    let start = Instant::now();

    let store = match state.keys.key_set_store().await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Failed to acquire key set store");
            return internal_error_response();
        }
    };

    let generated_at = match state.keys.generated_at().await {
        Ok(at) => at,
        Err(e) => {
            error!(error = %e, "Failed to read key generation time");
            return internal_error_response();
        }
    };

    let cache_control = format!("public, max-age={}", state.args.keys_max_age_seconds);
    let last_modified = http_date(generated_at);

    if not_modified(if_modified_since, generated_at) {
        debug!("Key set not modified since client copy");
        return key_set_response(
            StatusCode::NOT_MODIFIED,
            &cache_control,
            &last_modified,
            Bytes::new(),
        );
    }

    let body = match store.marshal().await {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "Failed to marshal key set");
            return internal_error_response();
        }
    };

    debug!(elapsed = ?start.elapsed(), "Served key set");

    key_set_response(StatusCode::OK, &cache_control, &last_modified, body)
}

fn key_set_response(
    status: StatusCode,
    cache_control: &str,
    last_modified: &str,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let response = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .header(CACHE_CONTROL, cache_control)
        .header(LAST_MODIFIED, last_modified)
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(Full::new(body));

    match response {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "Failed to build key set response");
            internal_error_response()
        }
    }
}

/// Generic 500; the cause is only logged
pub fn internal_error_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(
        br#"{"error":"Internal Server Error"}"#,
    )));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}
