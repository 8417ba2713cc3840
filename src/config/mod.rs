pub mod settings;

pub use settings::{
    Config, DispatchSettings, EngineConfig, EnginesConfig, FetchSettings, LogRotation,
    LoggingConfig, PoolConfig,
};

use anyhow::{ensure, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Failed to get config directory")?
        .join("search-fusion");

    // Create config directory if it doesn't exist
    fs::create_dir_all(&config_dir)
        .context("Failed to create config directory")?;

    Ok(config_dir.join("config.toml"))
}

/// Load configuration from file, or create default if not exists
///
/// Credentials from the environment are applied on top of the file.
pub fn load_or_create_config() -> Result<Config> {
    let path = config_path()?;

    let mut config = if path.exists() {
        load_from_path(&path)?
    } else {
        let config = Config::default();
        save_config_to(&config, &path)?;

        println!("Created default config at: {}", path.display());
        println!("Add engine API keys there or export them as environment variables.");

        config
    };

    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Load configuration from an explicit path without env overrides
pub fn load_from_path(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}

/// Save configuration to the default location
pub fn save_config(config: &Config) -> Result<()> {
    save_config_to(config, &config_path()?)
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .context("Failed to serialize config")?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}

const ENGINE_NAMES: [&str; 7] = ["google", "serper", "jina", "exa", "duckduckgo", "brave", "bing"];

/// Env variable names checked for each engine key, first match wins
const KEY_VARS: &[(&str, &[&str])] = &[
    ("google", &["GOOGLE_API_KEY", "GOOGLE_SEARCH_API_KEY"]),
    ("serper", &["SERPER_API_KEY", "SERPER_SEARCH_API_KEY"]),
    ("jina", &["JINA_API_KEY", "JINA_SEARCH_API_KEY"]),
    ("exa", &["EXA_API_KEY", "EXA_SEARCH_API_KEY"]),
    ("brave", &["BRAVE_API_KEY", "BRAVE_SEARCH_API_KEY"]),
    ("bing", &["BING_API_KEY", "BING_SEARCH_API_KEY"]),
];

impl Config {
    /// Apply credentials from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply credentials using a custom variable lookup
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for &(engine, names) in KEY_VARS {
            if let Some(key) = first_var(&lookup, names) {
                if let Some(section) = self.engine_mut(engine) {
                    section.api_key = Some(key);
                    tracing::debug!(engine = %engine, "api key loaded from environment");
                }
            }
        }

        if let Some(cse) = first_var(&lookup, &["GOOGLE_CSE_ID", "GOOGLE_SEARCH_CSE_ID"]) {
            self.engines.google.cse_id = Some(cse);
        }

        if self.pool.http_proxy.is_none() {
            self.pool.http_proxy = first_var(&lookup, &["HTTP_PROXY", "http_proxy"]);
        }
        if self.pool.https_proxy.is_none() {
            self.pool.https_proxy = first_var(&lookup, &["HTTPS_PROXY", "https_proxy"]);
        }
    }

    fn engine_mut(&mut self, name: &str) -> Option<&mut EngineConfig> {
        let engines = &mut self.engines;
        match name {
            "google" => Some(&mut engines.google),
            "serper" => Some(&mut engines.serper),
            "jina" => Some(&mut engines.jina),
            "exa" => Some(&mut engines.exa),
            "duckduckgo" => Some(&mut engines.duckduckgo),
            "brave" => Some(&mut engines.brave),
            "bing" => Some(&mut engines.bing),
            _ => None,
        }
    }

    /// Reject settings the core cannot run with
    pub fn validate(&self) -> Result<()> {
        let d = &self.dispatch;
        ensure!(d.max_concurrent > 0, "dispatch.max_concurrent must be greater than 0");
        ensure!(d.request_timeout_secs > 0, "dispatch.request_timeout_secs must be greater than 0");
        ensure!(d.attempt_timeout_secs > 0, "dispatch.attempt_timeout_secs must be greater than 0");
        ensure!(d.error_threshold != Some(0), "dispatch.error_threshold must be at least 1");
        for name in ENGINE_NAMES {
            let cooldown = self.engines.get(name).and_then(|e| e.cooldown_secs);
            ensure!(cooldown != Some(0), "engines.{name}.cooldown_secs must be greater than 0");
        }

        let p = &self.pool;
        ensure!(p.max_connections > 0, "pool.max_connections must be greater than 0");
        ensure!(p.connect_timeout_secs > 0, "pool.connect_timeout_secs must be greater than 0");
        ensure!(p.read_timeout_secs > 0, "pool.read_timeout_secs must be greater than 0");

        let f = &self.fetch;
        ensure!(f.page_max_length > 0, "fetch.page_max_length must be greater than 0");
        ensure!(f.page_cache_capacity > 0, "fetch.page_cache_capacity must be greater than 0");
        Ok(())
    }
}

fn first_var<F>(lookup: &F, names: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    names
        .iter()
        .filter_map(|name| lookup(*name))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}
