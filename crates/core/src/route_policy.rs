//! Proxy route policy: upstream base URLs and per-path timeouts.
//!
//! Simple CRUD reads and AI generation jobs have very different latency
//! profiles, so the gateway picks a timeout per request by matching path
//! keywords against an ordered rule table. The table is built once at
//! startup and is read-only afterwards.

use std::time::Duration;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Timeout constants
// ---------------------------------------------------------------------------

/// Timeout for ordinary proxied calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for downloads, generation and parsing endpoints.
pub const LONG_RUNNING_TIMEOUT: Duration = Duration::from_secs(120);

/// Path keywords that select [`LONG_RUNNING_TIMEOUT`].
pub const LONG_RUNNING_KEYWORDS: &[&str] =
    &["download", "generate", "parse", "regenerate", "structure"];

// ---------------------------------------------------------------------------
// Route groups
// ---------------------------------------------------------------------------

/// A logical group of proxied backend endpoints, each with its own upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteGroup {
    Youtube,
    Backlinks,
    Config,
}

impl RouteGroup {
    pub const ALL: [RouteGroup; 3] = [
        RouteGroup::Youtube,
        RouteGroup::Backlinks,
        RouteGroup::Config,
    ];

    /// Local mount segment, e.g. `/api/youtube/...`.
    pub fn as_str(self) -> &'static str {
        match self {
            RouteGroup::Youtube => "youtube",
            RouteGroup::Backlinks => "backlinks",
            RouteGroup::Config => "config",
        }
    }
}

// ---------------------------------------------------------------------------
// Timeout rules
// ---------------------------------------------------------------------------

/// One row of the timeout table: a path predicate and the timeout it selects.
#[derive(Debug, Clone)]
pub struct TimeoutRule {
    /// Substring matched against the lower-cased joined path.
    pub keyword: String,
    pub timeout: Duration,
}

impl TimeoutRule {
    pub fn new(keyword: impl Into<String>, timeout: Duration) -> Self {
        Self {
            keyword: keyword.into().to_lowercase(),
            timeout,
        }
    }

    pub fn matches(&self, lowered_path: &str) -> bool {
        lowered_path.contains(&self.keyword)
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Process-wide routing policy for the proxy gateway.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    rules: Vec<TimeoutRule>,
    default_timeout: Duration,
    upstreams: Vec<(RouteGroup, String)>,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self::with_timeouts(DEFAULT_TIMEOUT, LONG_RUNNING_TIMEOUT)
    }
}

impl RoutePolicy {
    /// Build the standard keyword table with custom default/long timeouts.
    pub fn with_timeouts(default_timeout: Duration, long_timeout: Duration) -> Self {
        Self {
            rules: LONG_RUNNING_KEYWORDS
                .iter()
                .map(|k| TimeoutRule::new(*k, long_timeout))
                .collect(),
            default_timeout,
            upstreams: Vec::new(),
        }
    }

    /// Register (or replace) the upstream base URL of a route group.
    ///
    /// Trailing slashes are stripped so joining never doubles them.
    pub fn with_upstream(mut self, group: RouteGroup, base_url: impl Into<String>) -> Self {
        let base = base_url.into().trim_end_matches('/').to_string();
        self.upstreams.retain(|(g, _)| *g != group);
        self.upstreams.push((group, base));
        self
    }

    /// Append a rule evaluated after the existing ones.
    pub fn push_rule(&mut self, rule: TimeoutRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[TimeoutRule] {
        &self.rules
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Select the timeout for a path-segment sequence.
    ///
    /// The segments are joined with `/` and lower-cased; the first rule whose
    /// keyword is a substring wins, otherwise the default applies.
    pub fn timeout_for<S: AsRef<str>>(&self, segments: &[S]) -> Duration {
        let lowered = join_segments(segments).to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map(|rule| rule.timeout)
            .unwrap_or(self.default_timeout)
    }

    pub fn upstream_base(&self, group: RouteGroup) -> Option<&str> {
        self.upstreams
            .iter()
            .find(|(g, _)| *g == group)
            .map(|(_, base)| base.as_str())
    }

    /// Build `{base}/{segments}` plus the verbatim query string, if any.
    pub fn upstream_url<S: AsRef<str>>(
        &self,
        group: RouteGroup,
        segments: &[S],
        query: Option<&str>,
    ) -> Result<String, CoreError> {
        let base = self.upstream_base(group).ok_or_else(|| {
            CoreError::Internal(format!(
                "No upstream configured for route group '{}'",
                group.as_str()
            ))
        })?;

        let mut url = format!("{base}/{}", join_segments(segments));
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(q);
        }
        Ok(url)
    }
}

/// Join path segments with `/`.
pub fn join_segments<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("/")
}

/// Split a captured wildcard path into non-empty segments.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}
