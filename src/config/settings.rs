use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log output settings
    pub logging: LoggingConfig,

    /// Failover, concurrency gate and cooldown settings
    pub dispatch: DispatchSettings,

    /// Shared HTTP transport limits
    pub pool: PoolConfig,

    /// Fetch-and-read path and page cache settings
    pub fetch: FetchSettings,

    /// Per-engine credentials and priority overrides
    pub engines: EnginesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write logs to a file instead of stderr
    pub file: bool,

    /// Default level for this crate (overridden by RUST_LOG)
    pub level: String,

    /// Log file path or directory (default: next to config.toml)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<LogRotation>,

    /// How many rotated files to keep (default: 7 daily, 20 session)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep: Option<usize>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: false,
            level: "info".to_string(),
            path: None,
            rotation: None,
            keep: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    None,
    Daily,
    Session,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Maximum simultaneous in-flight provider searches
    pub max_concurrent: usize,

    /// Wall-clock budget for one search request across all attempts
    pub request_timeout_secs: u64,

    /// Upper bound for a single provider attempt
    pub attempt_timeout_secs: u64,

    /// How long a request may wait for a concurrency slot
    pub gate_timeout_secs: u64,

    /// Cooldown applied after a rate-limit signal
    pub cooldown_secs: u64,

    /// Consecutive plain errors that also trigger cooldown (disabled when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_threshold: Option<u32>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 30,
            request_timeout_secs: 60,
            attempt_timeout_secs: 30,
            gate_timeout_secs: 10,
            cooldown_secs: 60,
            error_threshold: None,
        }
    }
}

impl DispatchSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn gate_timeout(&self) -> Duration {
        Duration::from_secs(self.gate_timeout_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum requests holding a connection at once
    pub max_connections: usize,

    /// Idle keep-alive connections retained per host
    pub max_idle_per_host: usize,

    /// Idle connections are closed after this long
    pub keepalive_secs: u64,

    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,

    /// How long a request may wait for a free connection slot
    pub pool_timeout_secs: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_proxy: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub https_proxy: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_idle_per_host: 20,
            keepalive_secs: 30,
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
            write_timeout_secs: 10,
            pool_timeout_secs: 5,
            user_agent: None,
            http_proxy: None,
            https_proxy: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Maximum characters per page before content is paginated
    pub page_max_length: usize,

    /// How long paginated content stays retrievable
    pub page_ttl_secs: u64,

    /// Maximum live paginated documents
    pub page_cache_capacity: usize,

    /// Overall budget for one fetch across all fetch methods
    pub fetch_timeout_secs: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub jina_reader_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub serper_scrape_url: Option<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            page_max_length: 50_000,
            page_ttl_secs: 3600,
            page_cache_capacity: 128,
            fetch_timeout_secs: 90,
            jina_reader_url: None,
            serper_scrape_url: None,
        }
    }
}

/// Credentials and overrides for every known engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnginesConfig {
    pub google: EngineConfig,
    pub serper: EngineConfig,
    pub jina: EngineConfig,
    pub exa: EngineConfig,
    pub duckduckgo: EngineConfig,
    pub brave: EngineConfig,
    pub bing: EngineConfig,
}

impl EnginesConfig {
    /// Look up an engine section by its registry name
    pub fn get(&self, name: &str) -> Option<&EngineConfig> {
        match name {
            "google" => Some(&self.google),
            "serper" => Some(&self.serper),
            "jina" => Some(&self.jina),
            "exa" => Some(&self.exa),
            "duckduckgo" => Some(&self.duckduckgo),
            "brave" => Some(&self.brave),
            "bing" => Some(&self.bing),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Set to false to leave the engine out of the registry entirely
    pub enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Google custom search engine id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cse_id: Option<String>,

    /// Lower is tried first; falls back to the engine's built-in priority
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,

    /// Override the API endpoint (self-hosted proxies, tests)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Rate-limit cooldown for this engine; falls back to the engine's
    /// built-in cooldown, then to `dispatch.cooldown_secs`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            cse_id: None,
            priority: None,
            base_url: None,
            cooldown_secs: None,
        }
    }
}

impl EngineConfig {
    /// Non-empty API key, if configured
    pub fn key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Configured cooldown, else `default`
    pub fn cooldown_or(&self, default: Option<Duration>) -> Option<Duration> {
        self.cooldown_secs.map(Duration::from_secs).or(default)
    }
}
