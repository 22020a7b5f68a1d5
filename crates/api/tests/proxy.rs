//! Integration tests for the catch-all proxy routes.

mod common;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{Method, Request, StatusCode};
use common::{
    app_with_upstream, body_bytes, body_json, build_test_app, get_uri, hangup_base, send,
    test_config, unreachable_base, PDF_BYTES, TEST_LONG_TIMEOUT_SECS, TEST_TIMEOUT_SECS,
};

// ---------------------------------------------------------------------------
// Test: GET JSON round-trip with path and query forwarded verbatim
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_forwards_path_and_query() {
    let app = app_with_upstream().await;
    let response = get_uri(app, "/api/youtube/projects/p1/storyboards?page=2&size=10").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["method"], "GET");
    assert_eq!(json["path"], "/api/youtube/projects/p1/storyboards");
    assert_eq!(json["query"], "page=2&size=10");
    assert!(json["content_type"].is_null());
}

#[tokio::test]
async fn each_route_group_has_its_own_upstream() {
    let app = app_with_upstream().await;

    let json = body_json(get_uri(app.clone(), "/api/backlinks/tasks/7").await).await;
    assert_eq!(json["path"], "/api/backlinks/tasks/7");

    let json = body_json(get_uri(app, "/api/config/semrush").await).await;
    assert_eq!(json["path"], "/api/config/semrush");
}

// ---------------------------------------------------------------------------
// Test: body and header forwarding
// ---------------------------------------------------------------------------

#[tokio::test]
async fn json_body_is_forwarded_with_json_content_type() {
    let app = app_with_upstream().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/youtube/projects")
        .header(CONTENT_TYPE, "text/plain;charset=UTF-8")
        .body(Body::from(r#"{"name":"Review"}"#))
        .unwrap();

    let json = body_json(send(app, request).await).await;
    assert_eq!(json["method"], "POST");
    assert_eq!(json["content_type"], "application/json");
    assert_eq!(json["body"], r#"{"name":"Review"}"#);
}

#[tokio::test]
async fn multipart_upload_keeps_boundary() {
    let app = app_with_upstream().await;
    let content_type = "multipart/form-data; boundary=----studio7MA4YWxk";
    let body = "------studio7MA4YWxk\r\n\
                Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\r\n\
                hello\r\n------studio7MA4YWxk--\r\n";
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/youtube/projects/p1/upload")
        .header(CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap();

    let json = body_json(send(app, request).await).await;
    assert_eq!(json["content_type"], content_type);
    assert_eq!(json["body"], body);
}

#[tokio::test]
async fn empty_post_sends_no_body_or_content_type() {
    let app = app_with_upstream().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/youtube/projects/p1/download")
        .body(Body::empty())
        .unwrap();

    let json = body_json(send(app, request).await).await;
    assert!(json["content_type"].is_null());
    assert_eq!(json["body_len"], 0);
}

#[tokio::test]
async fn delete_does_not_forward_body() {
    let app = app_with_upstream().await;
    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/api/youtube/projects/p9")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();

    let json = body_json(send(app, request).await).await;
    assert_eq!(json["method"], "DELETE");
    assert_eq!(json["body_len"], 0);
}

#[tokio::test]
async fn only_authorization_header_is_forwarded() {
    let app = app_with_upstream().await;
    let request = Request::builder()
        .uri("/api/youtube/me")
        .header(AUTHORIZATION, "Bearer abc")
        .header("cookie", "session=secret")
        .body(Body::empty())
        .unwrap();

    let json = body_json(send(app, request).await).await;
    assert_eq!(json["authorization"], "Bearer abc");
    assert!(json["cookie"].is_null());
}

#[tokio::test]
async fn unsupported_method_is_405() {
    let app = app_with_upstream().await;
    let request = Request::builder()
        .method("PROPFIND")
        .uri("/api/youtube/projects")
        .body(Body::empty())
        .unwrap();
    let response = send(app, request).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

// ---------------------------------------------------------------------------
// Test: response translation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn no_content_passes_through_empty() {
    let app = app_with_upstream().await;
    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/api/youtube/tasks/gone")
        .body(Body::empty())
        .unwrap();

    let response = send(app, request).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn binary_download_passes_through_with_disposition() {
    let app = app_with_upstream().await;
    let response = get_uri(app, "/api/youtube/files/report").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/pdf");
    assert_eq!(
        response.headers()[CONTENT_DISPOSITION],
        "attachment; filename=\"report.pdf\""
    );
    assert_eq!(&body_bytes(response).await[..], PDF_BYTES);
}

#[tokio::test]
async fn upstream_error_status_is_preserved() {
    let app = app_with_upstream().await;
    let request = Request::builder()
        .method(Method::PUT)
        .uri("/api/youtube/projects/p1")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"name":"x"}"#))
        .unwrap();

    let response = send(app, request).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["detail"], "modified by another user");
}

#[tokio::test]
async fn invalid_upstream_json_is_502() {
    let app = app_with_upstream().await;
    let response = get_uri(app, "/api/youtube/broken").await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["code"], "SERVER_ERROR");
}

// ---------------------------------------------------------------------------
// Test: timeouts follow the route policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ordinary_path_times_out_with_default_window() {
    let app = app_with_upstream().await;
    let response = get_uri(app, "/api/youtube/slow/list").await;

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let json = body_json(response).await;
    assert_eq!(json["code"], "TIMEOUT_ERROR");
    assert_eq!(json["timeout"], TEST_TIMEOUT_SECS);
}

#[tokio::test]
async fn download_path_times_out_with_long_window() {
    let app = app_with_upstream().await;
    let response = get_uri(app, "/api/youtube/slow/download").await;

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let json = body_json(response).await;
    assert_eq!(json["code"], "TIMEOUT_ERROR");
    assert_eq!(json["timeout"], TEST_LONG_TIMEOUT_SECS);
}

// ---------------------------------------------------------------------------
// Test: transport failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refused_connection_is_503() {
    let app = build_test_app(test_config(&unreachable_base()));
    let response = get_uri(app, "/api/youtube/projects").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(json["code"], "CONNECTION_ERROR");
    assert!(json["message"].is_string());
}

#[tokio::test]
async fn dropped_connection_is_502_connection_error() {
    let app = build_test_app(test_config(&hangup_base().await));
    let response = get_uri(app, "/api/youtube/projects").await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(response).await;
    assert_eq!(json["code"], "CONNECTION_ERROR");
    assert_eq!(json["error"], "Connection was reset by server");
    assert!(json["message"].is_string());
}
