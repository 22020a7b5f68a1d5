//! Catch-all proxy routes: `/api/{group}/{*path}`.
//!
//! Each route group forwards to its own upstream base URL. The handler picks
//! a timeout from the route policy, forwards an allow-listed set of headers
//! and translates the upstream response back. JSON is re-serialized, other
//! payloads pass through as bytes.

use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Path, RawQuery, State};
use axum::http::header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, MethodRouter};
use axum::{Json, Router};
use studio_core::route_policy::{split_path, RouteGroup};

use crate::error::{GatewayError, GatewayResult};
use crate::state::AppState;

/// Largest inbound body the proxy buffers (file uploads go through here).
pub const MAX_PROXY_BODY_BYTES: usize = 200 * 1024 * 1024;

/// Mount one catch-all route per route group.
pub fn router() -> Router<AppState> {
    RouteGroup::ALL
        .into_iter()
        .fold(Router::new(), |router, group| {
            router.route(&format!("/api/{}/{{*path}}", group.as_str()), group_routes(group))
        })
        .layer(DefaultBodyLimit::max(MAX_PROXY_BODY_BYTES))
}

/// GET/POST/PUT/PATCH/DELETE for one group. Other methods get 405.
fn group_routes(group: RouteGroup) -> MethodRouter<AppState> {
    let handler = move |State(state): State<AppState>,
                        method: Method,
                        Path(path): Path<String>,
                        RawQuery(query): RawQuery,
                        headers: HeaderMap,
                        body: Bytes| async move {
        proxy_request(&state, group, method, &path, query.as_deref(), &headers, body).await
    };

    get(handler.clone())
        .post(handler.clone())
        .put(handler.clone())
        .patch(handler.clone())
        .delete(handler)
}

async fn proxy_request(
    state: &AppState,
    group: RouteGroup,
    method: Method,
    path: &str,
    query: Option<&str>,
    headers: &HeaderMap,
    body: Bytes,
) -> GatewayResult<Response> {
    let segments = split_path(path);
    let timeout = state.policy.timeout_for(&segments);
    let url = state.policy.upstream_url(group, &segments, query)?;

    tracing::debug!(
        group = group.as_str(),
        %method,
        path,
        timeout_secs = timeout.as_secs(),
        "Proxying request",
    );

    let response = outbound_request(&state.http, method, &url, headers, body)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| transport_error(e, timeout, &url))?;

    translate_response(response, timeout, &url).await
}

/// Build the outbound request with the allow-listed headers and body.
fn outbound_request(
    client: &reqwest::Client,
    method: Method,
    url: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> reqwest::RequestBuilder {
    let carries_body = matches!(method, Method::POST | Method::PUT | Method::PATCH);
    let mut request = client.request(method, url);

    if let Some(auth) = headers.get(AUTHORIZATION) {
        request = request.header(AUTHORIZATION, auth.clone());
    }

    if !carries_body {
        return request;
    }

    match headers.get(CONTENT_TYPE) {
        // Boundary lives in the header, so it must travel with the raw bytes.
        Some(content_type) if is_multipart(content_type) => {
            request.header(CONTENT_TYPE, content_type.clone()).body(body)
        }
        _ if body.is_empty() => request,
        _ => request
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(body),
    }
}

fn is_multipart(content_type: &HeaderValue) -> bool {
    content_type
        .to_str()
        .is_ok_and(|ct| ct.to_ascii_lowercase().contains("multipart/form-data"))
}

fn is_json(content_type: Option<&HeaderValue>) -> bool {
    content_type
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"))
}

/// Translate the upstream response, preserving its status.
async fn translate_response(
    response: reqwest::Response,
    timeout: Duration,
    url: &str,
) -> GatewayResult<Response> {
    let status = response.status();
    if status == StatusCode::NO_CONTENT {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let content_type = response.headers().get(CONTENT_TYPE).cloned();
    let disposition = response.headers().get(CONTENT_DISPOSITION).cloned();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| transport_error(e, timeout, url))?;

    if is_json(content_type.as_ref()) {
        let value: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
            tracing::warn!(url, error = %e, "Upstream sent invalid JSON");
            GatewayError::Upstream(format!("Invalid JSON from upstream: {e}"))
        })?;
        return Ok((status, Json(value)).into_response());
    }

    let mut builder = Response::builder().status(status);
    if let Some(content_type) = content_type {
        builder = builder.header(CONTENT_TYPE, content_type);
    }
    if let Some(disposition) = disposition {
        builder = builder.header(CONTENT_DISPOSITION, disposition);
    }
    builder
        .body(Body::from(bytes))
        .map_err(|e| GatewayError::Internal(format!("Failed to build proxy response: {e}")))
}

fn transport_error(err: reqwest::Error, timeout: Duration, url: &str) -> GatewayError {
    let mapped = GatewayError::from_transport(err, timeout);
    tracing::warn!(url, error = %mapped, "Upstream request failed");
    mapped
}
