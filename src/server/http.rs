//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::{Body, Incoming};
use hyper::header::{HeaderValue, CONTENT_LENGTH, IF_MODIFIED_SINCE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::auth::TokenIssuer;
use crate::config::Args;
use crate::keys::{KeyManager, KeyManagerConfig};
use crate::routes;
use crate::types::KeywardError;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Signing key lifecycle; the single owner of key material
    pub keys: Arc<KeyManager>,
    /// Token signer/verifier sharing the same manager
    pub tokens: TokenIssuer,
    pub started_at: Instant,
}

impl AppState {
    /// Create AppState with a fresh key manager built from args
    pub fn new(args: Args) -> Self {
        let keys = Arc::new(KeyManager::new(KeyManagerConfig::from_args(&args)));
        Self::with_key_manager(args, keys)
    }

    /// Create AppState around an existing key manager
    pub fn with_key_manager(args: Args, keys: Arc<KeyManager>) -> Self {
        let tokens = TokenIssuer::new(
            Arc::clone(&keys),
            args.jwt_issuer.clone(),
            args.jwt_expiry_seconds,
        );
        Self {
            args,
            keys,
            tokens,
            started_at: Instant::now(),
        }
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), KeywardError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Keyward listening on {} as node {}",
        state.args.listen, state.args.node_id
    );
    info!("Key set published at /keys and /.well-known/jwks.json");

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("[{}] {} {}", addr, method, path);

    let if_modified_since = req
        .headers()
        .get(IF_MODIFIED_SINCE)
        .and_then(|h| h.to_str().ok());

    Ok(route(state, &method, &path, if_modified_since).await)
}

/// Dispatch a request to its handler
pub async fn route(
    state: Arc<AppState>,
    method: &Method,
    path: &str,
    if_modified_since: Option<&str>,
) -> Response<Full<Bytes>> {
    match (method, path) {
        // Liveness probe
        (&Method::GET, "/health") | (&Method::GET, "/healthz") => routes::health_check(state),

        // Readiness probe - initializes keys if needed
        (&Method::GET, "/ready") | (&Method::GET, "/readyz") => {
            routes::readiness_check(state).await
        }

        // Public key set (JWKS)
        (&Method::GET, "/keys") | (&Method::GET, "/.well-known/jwks.json") => {
            routes::handle_keys(state, if_modified_since).await
        }
        (&Method::HEAD, "/keys") | (&Method::HEAD, "/.well-known/jwks.json") => {
            without_body(routes::handle_keys(state, if_modified_since).await)
        }

        // CORS preflight
        (&Method::OPTIONS, _) => preflight_response(),

        (_, "/keys") | (_, "/.well-known/jwks.json") => method_not_allowed_response(),

        _ => not_found_response(path),
    }
}

/// Drop the body of a GET response for HEAD, keeping its length header
fn without_body(response: Response<Full<Bytes>>) -> Response<Full<Bytes>> {
    let length = response.body().size_hint().exact();
    let (mut parts, _) = response.into_parts();
    if let Some(length) = length.filter(|&n| n > 0) {
        parts.headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    }
    Response::from_parts(parts, Full::new(Bytes::new()))
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert(
        hyper::header::ACCESS_CONTROL_ALLOW_ORIGIN,
        hyper::header::HeaderValue::from_static("*"),
    );
    headers.insert(
        hyper::header::ACCESS_CONTROL_ALLOW_HEADERS,
        hyper::header::HeaderValue::from_static("*"),
    );
    headers.insert(
        hyper::header::ACCESS_CONTROL_ALLOW_METHODS,
        hyper::header::HeaderValue::from_static("GET, HEAD, OPTIONS"),
    );
    response
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        serde_json::json!({
            "error": "Not Found",
            "path": path,
            "hint": "Public keys are served at /keys"
        }),
    )
}

fn method_not_allowed_response() -> Response<Full<Bytes>> {
    let mut response = json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        serde_json::json!({ "error": "Method Not Allowed" }),
    );
    response.headers_mut().insert(
        hyper::header::ALLOW,
        hyper::header::HeaderValue::from_static("GET, HEAD, OPTIONS"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(Args::try_parse_from(["keyward"]).unwrap()))
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let response = route(state(), &Method::GET, "/nope", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_post_to_keys_is_405() {
        let response = route(state(), &Method::POST, "/keys", None).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            response.headers().get(hyper::header::ALLOW).unwrap(),
            "GET, HEAD, OPTIONS"
        );
    }

    #[tokio::test]
    async fn test_preflight() {
        let response = route(state(), &Method::OPTIONS, "/keys", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(hyper::header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_health_does_not_initialize_keys() {
        let state = state();
        let response = route(Arc::clone(&state), &Method::GET, "/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!state.keys.is_initialized());
    }

    #[tokio::test]
    async fn test_ready_initializes_keys() {
        let state = state();
        let response = route(Arc::clone(&state), &Method::GET, "/readyz", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.keys.is_initialized());
    }

    #[tokio::test]
    async fn test_head_keys_matches_get_without_body() {
        use http_body_util::BodyExt;

        let state = state();
        let get = route(Arc::clone(&state), &Method::GET, "/keys", None).await;
        let head = route(Arc::clone(&state), &Method::HEAD, "/keys", None).await;

        assert_eq!(head.status(), StatusCode::OK);
        for name in [
            hyper::header::CONTENT_TYPE,
            hyper::header::CACHE_CONTROL,
            hyper::header::LAST_MODIFIED,
        ] {
            assert_eq!(head.headers().get(&name), get.headers().get(&name));
        }

        let get_body = get.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(
            head.headers().get(CONTENT_LENGTH).unwrap(),
            &get_body.len().to_string()
        );
        assert!(head.into_body().collect().await.unwrap().to_bytes().is_empty());
    }

    #[tokio::test]
    async fn test_conditional_head_is_304() {
        let state = state();
        let get = route(Arc::clone(&state), &Method::GET, "/keys", None).await;
        let last_modified = get
            .headers()
            .get(hyper::header::LAST_MODIFIED)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        let head = route(state, &Method::HEAD, "/keys", Some(&last_modified)).await;
        assert_eq!(head.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn test_both_key_paths_serve_same_body() {
        use http_body_util::BodyExt;

        let state = state();
        let a = route(Arc::clone(&state), &Method::GET, "/keys", None).await;
        let b = route(state, &Method::GET, "/.well-known/jwks.json", None).await;

        let a = a.into_body().collect().await.unwrap().to_bytes();
        let b = b.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(a, b);
    }
}
