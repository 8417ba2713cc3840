pub mod blocking;
pub mod dispatcher;
pub mod gate;
pub mod providers;
pub mod registry;
pub mod stats;

pub use blocking::BlockingProvider;
pub use dispatcher::{
    AttemptFailure, DispatchConfig, DispatchError, DispatchStats, Dispatcher, FailureReason,
};
pub use gate::{ConcurrencyGate, GateError, GatePermit};
pub use registry::{Candidate, EngineRegistry, EngineStatus, ProviderDescriptor, RegistryError};
pub use stats::{CooldownPolicy, HealthSnapshot, StatsTracker};

use crate::transport::TransportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Search provider abstraction - different backends can be plugged in
///
/// Implementations are thin: translate the query into the backend's wire
/// format and classify failures. Health, ordering and retries live in
/// [`Dispatcher`].
#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    /// Unique registry key, lowercase
    fn name(&self) -> &str;

    /// Lower is tried first
    fn priority(&self) -> u32;

    fn requires_credential(&self) -> bool {
        true
    }

    /// Credential check only, never touches the network
    fn is_available(&self) -> bool;

    /// Rate-limit cooldown for this backend; `None` uses the registry policy
    fn cooldown(&self) -> Option<Duration> {
        None
    }

    /// Perform a search query returning at most `count` items
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchResult>, SearchError>;
}

/// Individual search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Page title
    pub title: String,
    /// Page URL
    pub url: String,
    /// Snippet/description of the page content
    pub snippet: String,
}

impl SearchResult {
    pub fn new(title: impl Into<String>, url: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
        }
    }
}

/// Which providers a request may use
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProviderPreference {
    /// Every eligible provider, in priority order
    #[default]
    Auto,
    /// Exactly this provider, no fallback
    Named(String),
}

impl ProviderPreference {
    /// `""` and `"auto"` (any case) mean automatic selection
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
            Self::Auto
        } else {
            Self::Named(trimmed.to_lowercase())
        }
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self, Self::Named(_))
    }
}

impl fmt::Display for ProviderPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// One logical search call
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub count: usize,
    pub preference: ProviderPreference,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, count: usize) -> Self {
        Self {
            query: query.into(),
            count,
            preference: ProviderPreference::Auto,
        }
    }

    pub fn with_preference(mut self, preference: ProviderPreference) -> Self {
        self.preference = preference;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    ProviderError,
    Timeout,
}

/// Outcome of one provider attempt
#[derive(Debug, Clone)]
pub struct SearchAttemptResult {
    pub provider: String,
    pub items: Vec<SearchResult>,
    pub outcome: AttemptOutcome,
    pub latency: Duration,
}

/// Coarse failure classes the dispatcher reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    RateLimit,
    Network,
    Timeout,
}

/// Search-related errors
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    Transport(#[from] TransportError),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Search timed out")]
    Timeout,

    #[error("No results")]
    NoResults,

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl SearchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SearchError::InvalidApiKey => ErrorKind::Auth,
            SearchError::RateLimitExceeded => ErrorKind::RateLimit,
            SearchError::Timeout => ErrorKind::Timeout,
            SearchError::Transport(TransportError::Request(e)) if e.is_timeout() => {
                ErrorKind::Timeout
            }
            _ => ErrorKind::Network,
        }
    }
}
