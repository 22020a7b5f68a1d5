use std::io::ErrorKind;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use studio_core::error::CoreError;

/// Gateway error type for HTTP handlers.
///
/// Every failure of a proxied call funnels into one of these variants and is
/// rendered as a `{ "error", "code", ... }` JSON body.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// A domain-level error from `studio_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The upstream did not answer within the route's timeout.
    #[error("Upstream request timed out after {}s", .timeout.as_secs())]
    Timeout { timeout: Duration },

    /// The upstream could not be reached (refused, DNS, connect).
    #[error("Cannot connect to backend: {0}")]
    Connection(String),

    /// The connection was reset or closed before a complete answer arrived.
    #[error("Connection reset by backend: {0}")]
    ConnectionReset(String),

    /// The upstream answered garbage or failed in an unexpected way.
    #[error("Bad gateway: {0}")]
    Upstream(String),

    /// The upstream answered with a non-success status where bytes were expected.
    #[error("Upstream responded with {status}")]
    UpstreamStatus { status: StatusCode },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for handler return values.
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// Classify a transport-level failure of an outbound request.
    ///
    /// `timeout` is the window that was applied, reported back to the caller.
    pub fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout { timeout }
        } else if err.is_connect() {
            GatewayError::Connection(err.to_string())
        } else if err.is_request() || is_connection_reset(&err) {
            // Sent, but the peer hung up before answering (or mid-body).
            GatewayError::ConnectionReset(err.to_string())
        } else {
            GatewayError::Upstream(err.to_string())
        }
    }
}

/// Whether an I/O error in the source chain says the peer dropped the connection.
fn is_connection_reset(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            return matches!(
                io.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
            );
        }
        current = e.source();
    }
    false
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code, message, extra) = match &self {
            // --- CoreError variants ---
            GatewayError::Core(core) => match core {
                CoreError::NotFound { .. } => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", core.to_string(), None)
                }
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), None)
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone(), None),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                        None,
                    )
                }
            },

            // --- Upstream failures ---
            GatewayError::Timeout { timeout } => (
                StatusCode::GATEWAY_TIMEOUT,
                "TIMEOUT_ERROR",
                "Request timed out, please try again later".to_string(),
                Some(("timeout", json!(timeout.as_secs()))),
            ),
            GatewayError::Connection(detail) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "CONNECTION_ERROR",
                "Cannot connect to the backend service".to_string(),
                Some(("message", json!(detail))),
            ),
            GatewayError::ConnectionReset(detail) => (
                StatusCode::BAD_GATEWAY,
                "CONNECTION_ERROR",
                "Connection was reset by server".to_string(),
                Some(("message", json!(detail))),
            ),
            GatewayError::Upstream(detail) => (
                StatusCode::BAD_GATEWAY,
                "SERVER_ERROR",
                "Backend connection failed".to_string(),
                Some(("message", json!(detail))),
            ),
            GatewayError::UpstreamStatus { status } => (
                *status,
                "UPSTREAM_ERROR",
                format!("Failed to fetch resource: {}", status.as_u16()),
                None,
            ),

            // --- HTTP-specific errors ---
            GatewayError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), None),
            GatewayError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let Some((key, value)) = extra {
            body[key] = value;
        }

        (status, axum::Json(body)).into_response()
    }
}
