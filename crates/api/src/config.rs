use std::str::FromStr;
use std::time::Duration;

use studio_core::route_policy::{RouteGroup, RoutePolicy};

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development, where the
/// backend runs on port 8000 next to the gateway.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// Outer per-request safety net in seconds. Must exceed the long proxy timeout.
    pub request_timeout_secs: u64,
    pub youtube_api_base_url: String,
    pub backlinks_api_base_url: String,
    pub config_api_base_url: String,
    /// Base that relative media paths are resolved against.
    pub media_backend_base_url: String,
    /// Timeout for ordinary proxied calls, in seconds.
    pub proxy_timeout_secs: u64,
    /// Timeout for download / generation / parsing calls, in seconds.
    pub proxy_long_timeout_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                             |
    /// |---------------------------|-------------------------------------|
    /// | `HOST`                    | `0.0.0.0`                           |
    /// | `PORT`                    | `3000`                              |
    /// | `CORS_ORIGINS`            | `http://localhost:3000`             |
    /// | `REQUEST_TIMEOUT_SECS`    | `150`                               |
    /// | `YOUTUBE_API_BASE_URL`    | `http://localhost:8000/api/youtube` |
    /// | `BACKLINKS_API_BASE_URL`  | `http://localhost:8000/api/backlinks` |
    /// | `CONFIG_API_BASE_URL`     | `http://localhost:8000/api/config`  |
    /// | `MEDIA_BACKEND_BASE_URL`  | `http://localhost:8000`             |
    /// | `PROXY_TIMEOUT_SECS`      | `30`                                |
    /// | `PROXY_LONG_TIMEOUT_SECS` | `120`                               |
    ///
    /// Panics on unparseable numbers, or when `REQUEST_TIMEOUT_SECS` does not
    /// exceed `PROXY_LONG_TIMEOUT_SECS`, so misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let cors_origins: Vec<String> = env_or("CORS_ORIGINS", "http://localhost:3000")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let config = Self {
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse("PORT", 3000),
            cors_origins,
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", 150),
            youtube_api_base_url: env_or("YOUTUBE_API_BASE_URL", "http://localhost:8000/api/youtube"),
            backlinks_api_base_url: env_or(
                "BACKLINKS_API_BASE_URL",
                "http://localhost:8000/api/backlinks",
            ),
            config_api_base_url: env_or("CONFIG_API_BASE_URL", "http://localhost:8000/api/config"),
            media_backend_base_url: env_or("MEDIA_BACKEND_BASE_URL", "http://localhost:8000"),
            proxy_timeout_secs: env_parse("PROXY_TIMEOUT_SECS", 30),
            proxy_long_timeout_secs: env_parse("PROXY_LONG_TIMEOUT_SECS", 120),
        };
        config.validate();
        config
    }

    /// Check cross-field invariants. Panics on violation.
    ///
    /// The outer request timeout must fire after every proxy timeout,
    /// otherwise slow upstreams get an empty 504 instead of the JSON error.
    pub fn validate(&self) {
        let longest = self.proxy_timeout_secs.max(self.proxy_long_timeout_secs);
        if self.request_timeout_secs <= longest {
            panic!(
                "REQUEST_TIMEOUT_SECS ({}) must exceed the longest proxy timeout ({longest}s)",
                self.request_timeout_secs
            );
        }
    }

    /// Configured upstream base URL of a proxy route group.
    pub fn upstream_base(&self, group: RouteGroup) -> &str {
        match group {
            RouteGroup::Youtube => &self.youtube_api_base_url,
            RouteGroup::Backlinks => &self.backlinks_api_base_url,
            RouteGroup::Config => &self.config_api_base_url,
        }
    }

    /// Build the read-only route policy shared by all proxy handlers.
    pub fn route_policy(&self) -> RoutePolicy {
        RouteGroup::ALL.into_iter().fold(
            RoutePolicy::with_timeouts(
                Duration::from_secs(self.proxy_timeout_secs),
                Duration::from_secs(self.proxy_long_timeout_secs),
            ),
            |policy, group| policy.with_upstream(group, self.upstream_base(group)),
        )
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} must be a valid {}: {e}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}
