//! Shared fixtures for gateway integration tests.
//!
//! Tests run the real router against a stub upstream bound to an ephemeral
//! local port, so every forwarding rule is observed from the upstream side.

#![allow(dead_code)]

use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use studio_api::config::ServerConfig;
use studio_api::router::build_app_router;
use studio_api::state::AppState;

/// Proxy timeouts used by tests, kept short so timeout tests finish quickly.
pub const TEST_TIMEOUT_SECS: u64 = 1;
pub const TEST_LONG_TIMEOUT_SECS: u64 = 2;

/// Build a test `ServerConfig` whose upstreams all live under `upstream`.
pub fn test_config(upstream: &str) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:3000".to_string()],
        request_timeout_secs: 30,
        youtube_api_base_url: format!("{upstream}/api/youtube"),
        backlinks_api_base_url: format!("{upstream}/api/backlinks"),
        config_api_base_url: format!("{upstream}/api/config"),
        media_backend_base_url: upstream.to_string(),
        proxy_timeout_secs: TEST_TIMEOUT_SECS,
        proxy_long_timeout_secs: TEST_LONG_TIMEOUT_SECS,
    }
}

/// Build the full application router, mirroring `main.rs`.
pub fn build_test_app(config: ServerConfig) -> Router {
    build_app_router(AppState::new(config))
}

/// Start the stub upstream and return its base URL.
pub async fn spawn_upstream() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, stub_upstream()).await.unwrap();
    });
    format!("http://{addr}")
}

/// App wired to a freshly started stub upstream.
pub async fn app_with_upstream() -> Router {
    let upstream = spawn_upstream().await;
    build_test_app(test_config(&upstream))
}

/// Base URL of a port that nothing listens on.
pub fn unreachable_base() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Base URL of a server that accepts connections and drops them unanswered.
pub async fn hangup_base() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            drop(socket);
        }
    });
    format!("http://{addr}")
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

pub async fn get_uri(app: Router, uri: &str) -> Response {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn body_bytes(response: Response) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

// ---------------------------------------------------------------------------
// Stub upstream
// ---------------------------------------------------------------------------

/// PNG signature, enough for byte-for-byte comparisons.
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
pub const PDF_BYTES: &[u8] = b"%PDF-1.7 fake";

fn stub_upstream() -> Router {
    Router::new().route("/{*path}", any(dispatch))
}

/// Route by exact path; anything unrecognised is echoed back.
async fn dispatch(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    match uri.path() {
        "/api/youtube/tasks/gone" => StatusCode::NO_CONTENT.into_response(),
        "/api/youtube/files/report" => (
            [
                (CONTENT_TYPE, "application/pdf"),
                (CONTENT_DISPOSITION, "attachment; filename=\"report.pdf\""),
            ],
            PDF_BYTES,
        )
            .into_response(),
        "/api/youtube/broken" => ([(CONTENT_TYPE, "application/json")], "{not json").into_response(),
        "/api/youtube/projects/p1" => (
            StatusCode::CONFLICT,
            Json(json!({ "detail": "modified by another user" })),
        )
            .into_response(),
        path if path.starts_with("/api/youtube/slow/") => {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Json(json!({ "late": true })).into_response()
        }
        "/static/a.png" => ([(CONTENT_TYPE, "image/png")], PNG_BYTES).into_response(),
        "/static/raw" => Response::new(Body::from("raw")),
        "/static/missing.png" => StatusCode::NOT_FOUND.into_response(),
        _ => echo(method, &uri, &headers, &body).into_response(),
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Describe the received request as JSON.
fn echo(method: Method, uri: &Uri, headers: &HeaderMap, body: &Bytes) -> Json<Value> {
    Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "content_type": header(headers, "content-type"),
        "authorization": header(headers, "authorization"),
        "cookie": header(headers, "cookie"),
        "body": String::from_utf8_lossy(body),
        "body_len": body.len(),
    }))
}
