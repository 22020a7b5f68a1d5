use std::sync::Arc;

use studio_core::route_policy::RoutePolicy;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone; everything in it is read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Outbound HTTP client, shared so connections are pooled.
    pub http: reqwest::Client,
    /// Upstream bases and per-path timeouts.
    pub policy: Arc<RoutePolicy>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let policy = config.route_policy();
        Self {
            config: Arc::new(config),
            http: reqwest::Client::new(),
            policy: Arc::new(policy),
        }
    }
}
