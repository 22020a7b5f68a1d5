//! REST client for the gateway's `/api/youtube` endpoints.
//!
//! Wraps the HTTP API (task status and controls, generation submission,
//! project updates) using [`reqwest`]. Every failure is classified into
//! [`ApiError`] exactly once, here; callers never inspect raw status codes.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use studio_core::error::CoreError;
use studio_core::task::{Task, TaskReceipt};

use crate::source::{GenerationKind, TaskCommands, TaskLauncher, TaskSource};

/// HTTP status the backend uses for stale writes.
pub const CONFLICT_STATUS: u16 = 409;

/// Gateway `code` values that decide the error class on their own.
const CODE_TIMEOUT: &str = "TIMEOUT_ERROR";
const CODE_CONNECTION: &str = "CONNECTION_ERROR";
const SERVER_CODES: &[&str] = &["SERVER_ERROR", "UNKNOWN_ERROR", "INTERNAL_ERROR"];

/// Message used when an error body carries nothing readable.
const FALLBACK_MESSAGE: &str = "Request failed";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Closed set of failures surfaced by the API client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The gateway (504) or the client itself gave up waiting.
    #[error("Request timed out")]
    Timeout {
        /// Timeout window reported by the gateway, in seconds.
        timeout_secs: Option<u64>,
    },

    /// The backend could not be reached (`CONNECTION_ERROR`, a bare 502/503,
    /// or a transport failure).
    #[error("Connection error: {message}")]
    Connection { status: Option<u16>, message: String },

    /// The write was rejected because the resource changed underneath it.
    #[error("Conflict: {}", .detail.as_deref().unwrap_or("the resource was modified concurrently"))]
    Conflict { detail: Option<String> },

    /// Any other non-2xx response, including a 502 the gateway tagged as a
    /// server failure.
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// A 2xx response whose body did not match the expected shape.
    #[error("Invalid response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// Classify a non-2xx response from its status and raw body.
    ///
    /// The body is parsed best-effort; the message is taken from `error`,
    /// `detail` or `message`, in that order. A gateway `code` field decides
    /// the class when present, since 502 covers both unreachable backends
    /// and broken upstream answers. Without one the status decides.
    pub fn from_status(status: u16, body: &[u8]) -> Self {
        let json: Option<Value> = serde_json::from_slice(body).ok();
        let code = json
            .as_ref()
            .and_then(|v| v.get("code"))
            .and_then(Value::as_str);

        let timeout = || ApiError::Timeout {
            timeout_secs: json
                .as_ref()
                .and_then(|v| v.get("timeout"))
                .and_then(Value::as_u64),
        };
        let connection = || ApiError::Connection {
            status: Some(status),
            message: extract_message(json.as_ref()),
        };
        let server = || ApiError::Server {
            status,
            message: extract_message(json.as_ref()),
        };

        match (status, code) {
            (CONFLICT_STATUS, _) => ApiError::Conflict {
                detail: json
                    .as_ref()
                    .and_then(|v| v.get("detail"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            (_, Some(CODE_TIMEOUT)) => timeout(),
            (_, Some(CODE_CONNECTION)) => connection(),
            (_, Some(code)) if SERVER_CODES.contains(&code) => server(),
            (504, _) => timeout(),
            (502 | 503, _) => connection(),
            _ => server(),
        }
    }

    /// HTTP status associated with the error, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Timeout { .. } => Some(504),
            ApiError::Connection { status, .. } => *status,
            ApiError::Conflict { .. } => Some(CONFLICT_STATUS),
            ApiError::Server { status, .. } => Some(*status),
            ApiError::Decode(_) => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ApiError::Conflict { .. })
    }

    /// Detail text of a conflict, `None` for other errors.
    pub fn conflict_detail(&self) -> Option<&str> {
        match self {
            ApiError::Conflict { detail } => detail.as_deref(),
            _ => None,
        }
    }

    /// The backend refused a state transition (conflict or bad request).
    ///
    /// Controls treat this as non-fatal when the task already moved on.
    pub fn is_transition_rejected(&self) -> bool {
        matches!(self.status(), Some(CONFLICT_STATUS) | Some(400))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout { timeout_secs: None }
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Connection {
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { .. } => ApiError::Server {
                status: 404,
                message: err.to_string(),
            },
            CoreError::Validation(msg) => ApiError::Server {
                status: 400,
                message: msg,
            },
            CoreError::Conflict(msg) => ApiError::Conflict { detail: Some(msg) },
            CoreError::Internal(msg) => ApiError::Server {
                status: 500,
                message: msg,
            },
        }
    }
}

/// Find an [`ApiError`] anywhere in an error's source chain.
pub fn find_api_error<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a ApiError> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(api) = e.downcast_ref::<ApiError>() {
            return Some(api);
        }
        current = e.source();
    }
    None
}

/// Whether `err` (or anything it wraps) is a conflict signal.
pub fn is_conflict_error(err: &(dyn std::error::Error + 'static)) -> bool {
    find_api_error(err).is_some_and(ApiError::is_conflict)
}

fn extract_message(json: Option<&Value>) -> String {
    ["error", "detail", "message"]
        .iter()
        .find_map(|key| json?.get(*key)?.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_MESSAGE.to_string())
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Gateway prefix used when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/api/youtube";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    /// Client-side request timeout. `None` leaves timing out to the gateway.
    pub timeout: Option<Duration>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
        }
    }
}

/// HTTP client for the YouTube production API behind the gateway.
pub struct StudioApi {
    client: reqwest::Client,
    base_url: String,
}

impl StudioApi {
    /// Create a new client.
    ///
    /// * `base_url` - gateway prefix, e.g. `http://localhost:3000/api/youtube`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Create a client from [`ApiConfig`].
    pub fn from_config(config: &ApiConfig) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self::with_client(builder.build()?, config.base_url.clone()))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ---- generic verbs ----

    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.send(self.client.get(self.url(endpoint))).await
    }

    pub async fn post_json<B, T>(&self, endpoint: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(self.client.post(self.url(endpoint)).json(body)).await
    }

    pub async fn put_json<B, T>(&self, endpoint: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(self.client.put(self.url(endpoint)).json(body)).await
    }

    pub async fn patch_json<B, T>(&self, endpoint: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(self.client.patch(self.url(endpoint)).json(body)).await
    }

    /// Issue a `DELETE`, discarding any response body.
    pub async fn delete(&self, endpoint: &str) -> Result<(), ApiError> {
        let response = self.client.delete(self.url(endpoint)).send().await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    // ---- tasks ----

    /// `GET /tasks/{id}`
    pub async fn get_task(&self, task_id: &str) -> Result<Task, ApiError> {
        self.get_json(&format!("/tasks/{task_id}")).await
    }

    /// `POST /tasks/{id}/pause`
    pub async fn pause_task(&self, task_id: &str) -> Result<Task, ApiError> {
        self.task_action(task_id, "pause").await
    }

    /// `POST /tasks/{id}/resume`
    pub async fn resume_task(&self, task_id: &str) -> Result<Task, ApiError> {
        self.task_action(task_id, "resume").await
    }

    /// `POST /tasks/{id}/cancel`
    pub async fn cancel_task(&self, task_id: &str) -> Result<Task, ApiError> {
        self.task_action(task_id, "cancel").await
    }

    // ---- generation ----

    /// `POST /projects/{id}/generate/images`
    pub async fn generate_images(
        &self,
        project_id: &str,
        storyboard_indices: Option<&[u32]>,
    ) -> Result<TaskReceipt, ApiError> {
        let body = serde_json::json!({ "storyboard_indices": storyboard_indices });
        self.post_json(&format!("/projects/{project_id}/generate/images"), &body)
            .await
    }

    /// `POST /projects/{id}/generate/videos`
    pub async fn generate_videos(
        &self,
        project_id: &str,
        storyboard_indices: Option<&[u32]>,
    ) -> Result<TaskReceipt, ApiError> {
        let body = serde_json::json!({ "storyboard_indices": storyboard_indices });
        self.post_json(&format!("/projects/{project_id}/generate/videos"), &body)
            .await
    }

    /// `POST /projects/{id}/download`
    pub async fn start_download(&self, project_id: &str) -> Result<TaskReceipt, ApiError> {
        let response = self
            .client
            .post(self.url(&format!("/projects/{project_id}/download")))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    // ---- projects ----

    /// `PUT /projects/{id}`; may answer 409 when another user saved first.
    pub async fn update_project(&self, project_id: &str, changes: &Value) -> Result<Value, ApiError> {
        self.put_json(&format!("/projects/{project_id}"), changes).await
    }

    // ---- private helpers ----

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    async fn task_action(&self, task_id: &str, action: &str) -> Result<Task, ApiError> {
        let response = self
            .client
            .post(self.url(&format!("/tasks/{task_id}/{action}")))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, ApiError> {
        let response = request.send().await?;
        Self::parse_response(response).await
    }

    /// Return the response unchanged on success, or the classified error.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.bytes().await.unwrap_or_default();
        let err = ApiError::from_status(status.as_u16(), &body);
        tracing::debug!(status = status.as_u16(), error = %err, "API request failed");
        Err(err)
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl TaskSource for StudioApi {
    async fn fetch_task(&self, task_id: &str) -> Result<Task, ApiError> {
        self.get_task(task_id).await
    }
}

#[async_trait]
impl TaskCommands for StudioApi {
    async fn pause(&self, task_id: &str) -> Result<Task, ApiError> {
        self.pause_task(task_id).await
    }

    async fn resume(&self, task_id: &str) -> Result<Task, ApiError> {
        self.resume_task(task_id).await
    }

    async fn cancel(&self, task_id: &str) -> Result<Task, ApiError> {
        self.cancel_task(task_id).await
    }
}

#[async_trait]
impl TaskLauncher for StudioApi {
    async fn launch(&self, project_id: &str, kind: GenerationKind) -> Result<TaskReceipt, ApiError> {
        match kind {
            GenerationKind::Images => self.generate_images(project_id, None).await,
            GenerationKind::Videos => self.generate_videos(project_id, None).await,
            GenerationKind::Download => self.start_download(project_id).await,
        }
    }
}
