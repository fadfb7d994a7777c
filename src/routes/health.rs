//! Health check endpoints
//!
//! Provides Kubernetes-style health probes:
//! - /health, /healthz - Liveness probe (is the service running?)
//! - /ready, /readyz - Readiness probe (can the service sign and publish?)
//!
//! Liveness never touches key state. Readiness initializes the signing key
//! if needed and reports 503 when that fails.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::server::AppState;

/// Health response
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall health status (true if service is running)
    pub healthy: bool,
    /// Service version
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime: u64,
    /// Current timestamp
    pub timestamp: String,
    /// Node identifier
    pub node_id: String,
    /// Signing key status
    pub keys: KeyHealth,
    /// Error message if keys are unavailable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Signing key status
#[derive(Serialize)]
pub struct KeyHealth {
    /// Whether the signing key has been generated
    pub initialized: bool,
    /// Published key ID, once generated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

fn build_health_response(state: &AppState, error: Option<String>) -> HealthResponse {
    HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        node_id: state.args.node_id.to_string(),
        keys: KeyHealth {
            initialized: state.keys.is_initialized(),
            kid: state.keys.initialized_key_id().map(str::to_string),
        },
        error,
    }
}

/// Handle liveness probe (/health, /healthz)
///
/// Returns 200 OK if the service is running.
pub fn health_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let response = build_health_response(&state, None);

    let body = serde_json::to_string(&response)
        .unwrap_or_else(|_| r#"{"healthy":true,"error":"Serialization failed"}"#.to_string());

    json_response(StatusCode::OK, body)
}

/// Handle readiness probe (/ready, /readyz)
///
/// Returns 200 OK only once the signing key exists.
pub async fn readiness_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let (status, error) = match state.keys.ensure_initialized().await {
        Ok(()) => (StatusCode::OK, None),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Some("Signing keys unavailable".to_string()),
            )
        }
    };

    let mut response = build_health_response(&state, error);
    response.healthy = status == StatusCode::OK;

    let body = serde_json::to_string(&response)
        .unwrap_or_else(|_| r#"{"healthy":false,"error":"Serialization failed"}"#.to_string());

    json_response(status, body)
}

fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}
