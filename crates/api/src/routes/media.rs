//! Media proxy: `GET /api/proxy/media?url=<encoded>`.
//!
//! Lets the browser load generated images and videos hosted on other
//! origins. The body is streamed through without buffering.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH, USER_AGENT,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::TryStreamExt;
use serde::Deserialize;
use studio_core::media::{
    etag_matches, media_etag, resolve_media_url, DEFAULT_MEDIA_CONTENT_TYPE, MEDIA_CACHE_CONTROL,
    MEDIA_USER_AGENT,
};

use crate::error::{GatewayError, GatewayResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MediaQuery {
    pub url: Option<String>,
}

/// Mount the media proxy route.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/proxy/media", get(proxy_media))
}

async fn proxy_media(
    State(state): State<AppState>,
    Query(query): Query<MediaQuery>,
    headers: HeaderMap,
) -> GatewayResult<Response> {
    let raw = query
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| GatewayError::BadRequest("Missing url parameter".to_string()))?;
    let target = resolve_media_url(&raw, &state.config.media_backend_base_url)?;
    let etag = media_etag(&target);

    let revalidated = headers
        .get(IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|candidates| etag_matches(candidates, &etag));
    if revalidated {
        tracing::debug!(url = %target, "Media not modified");
        return media_response(StatusCode::NOT_MODIFIED, None, &etag, Body::empty());
    }

    // Bounds the wait for response headers only; the body may stream for longer.
    let timeout = state.policy.default_timeout();
    let upstream = tokio::time::timeout(
        timeout,
        state
            .http
            .get(&target)
            .header(USER_AGENT, MEDIA_USER_AGENT)
            .send(),
    )
    .await
    .map_err(|_| GatewayError::Timeout { timeout })?
    .map_err(|e| {
        let err = GatewayError::from_transport(e, timeout);
        tracing::warn!(url = %target, error = %err, "Media fetch failed");
        err
    })?;

    let status = upstream.status();
    if !status.is_success() {
        tracing::warn!(url = %target, status = status.as_u16(), "Media upstream returned error");
        return Err(GatewayError::UpstreamStatus { status });
    }

    let content_type = upstream.headers().get(CONTENT_TYPE).cloned();
    let stream = upstream
        .bytes_stream()
        .inspect_err(|e| tracing::warn!(error = %e, "Media stream interrupted"));

    media_response(StatusCode::OK, content_type, &etag, Body::from_stream(stream))
}

fn media_response(
    status: StatusCode,
    content_type: Option<HeaderValue>,
    etag: &str,
    body: Body,
) -> GatewayResult<Response> {
    let mut builder = Response::builder()
        .status(status)
        .header(CACHE_CONTROL, MEDIA_CACHE_CONTROL)
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(ETAG, etag);
    if status != StatusCode::NOT_MODIFIED {
        builder = builder.header(
            CONTENT_TYPE,
            content_type.unwrap_or(HeaderValue::from_static(DEFAULT_MEDIA_CONTENT_TYPE)),
        );
    }
    builder
        .body(body)
        .map_err(|e| GatewayError::Internal(format!("Failed to build media response: {e}")))
}
