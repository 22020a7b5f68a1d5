//! Integration tests for the media proxy route.

mod common;

use axum::body::Body;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH,
};
use axum::http::{Request, StatusCode};
use common::{
    app_with_upstream, body_bytes, body_json, build_test_app, get_uri, send, spawn_upstream,
    test_config, unreachable_base, PNG_BYTES,
};
use studio_core::media::{media_etag, MEDIA_CACHE_CONTROL};

fn media_uri(url: &str) -> String {
    let mut encoded = String::new();
    for b in url.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(b as char)
            }
            _ => encoded.push_str(&format!("%{b:02X}")),
        }
    }
    format!("/api/proxy/media?url={encoded}")
}

// ---------------------------------------------------------------------------
// Test: relative paths resolve against the media backend
// ---------------------------------------------------------------------------

#[tokio::test]
async fn relative_path_is_fetched_from_backend() {
    let upstream = spawn_upstream().await;
    let app = build_test_app(test_config(&upstream));

    let response = get_uri(app, &media_uri("/static/a.png")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[CONTENT_TYPE], "image/png");
    assert_eq!(headers[CACHE_CONTROL], MEDIA_CACHE_CONTROL);
    assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(
        headers[ETAG].to_str().unwrap(),
        media_etag(&format!("{upstream}/static/a.png"))
    );
    assert_eq!(&body_bytes(response).await[..], PNG_BYTES);
}

#[tokio::test]
async fn absolute_url_passes_through() {
    let upstream = spawn_upstream().await;
    // Media backend points elsewhere; the absolute URL must be used as-is.
    let mut config = test_config(&upstream);
    config.media_backend_base_url = unreachable_base();
    let app = build_test_app(config);

    let response = get_uri(app, &media_uri(&format!("{upstream}/static/a.png"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(&body_bytes(response).await[..], PNG_BYTES);
}

#[tokio::test]
async fn missing_content_type_defaults_to_octet_stream() {
    let app = app_with_upstream().await;
    let response = get_uri(app, &media_uri("static/raw")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/octet-stream");
    assert_eq!(&body_bytes(response).await[..], b"raw");
}

// ---------------------------------------------------------------------------
// Test: conditional requests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn matching_if_none_match_is_304_without_upstream() {
    let backend = unreachable_base();
    let app = build_test_app(test_config(&backend));
    let etag = media_etag(&format!("{backend}/static/a.png"));

    let request = Request::get(media_uri("/static/a.png"))
        .header(IF_NONE_MATCH, &etag)
        .body(Body::empty())
        .unwrap();
    let response = send(app, request).await;

    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(response.headers()[ETAG].to_str().unwrap(), etag);
    assert!(body_bytes(response).await.is_empty());
}

// ---------------------------------------------------------------------------
// Test: rejected and failed requests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_url_is_400() {
    let app = app_with_upstream().await;
    let response = get_uri(app, "/api/proxy/media").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn unsupported_scheme_is_400() {
    let app = app_with_upstream().await;
    let response = get_uri(app, &media_uri("file:///etc/passwd")).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn upstream_404_is_reported_with_its_status() {
    let app = app_with_upstream().await;
    let response = get_uri(app, &media_uri("/static/missing.png")).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "UPSTREAM_ERROR");
    assert_eq!(json["error"], "Failed to fetch resource: 404");
}

#[tokio::test]
async fn unreachable_media_host_is_503() {
    let app = build_test_app(test_config(&unreachable_base()));
    let response = get_uri(app, &media_uri("/static/a.png")).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["code"], "CONNECTION_ERROR");
}
