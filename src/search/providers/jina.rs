use super::{read_json, str_field};
use crate::config::EngineConfig;
use crate::search::{SearchError, SearchProvider, SearchResult};
use crate::transport::ConnectionPool;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_URL: &str = "https://s.jina.ai/";
const PREMIUM_URL: &str = "https://api.jina.ai/v1/search";

/// s.jina.ai answers at most this many results per call
const BASIC_LIMIT: usize = 10;
const PREMIUM_LIMIT: usize = 100;

/// Jina AI search, key required
///
/// Requests for more than ten results go to the keyed search API, which
/// returns up to a hundred.
pub struct JinaSearchProvider {
    pool: Arc<ConnectionPool>,
    api_key: Option<String>,
    base_url: String,
    premium_url: String,
    priority: u32,
    cooldown: Option<Duration>,
}

impl JinaSearchProvider {
    pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);
    pub const DEFAULT_PRIORITY: u32 = 15;

    pub fn new(pool: Arc<ConnectionPool>, config: &EngineConfig) -> Self {
        Self {
            pool,
            api_key: config.key().map(str::to_string),
            base_url: config.base_url.clone().unwrap_or_else(|| DEFAULT_URL.to_string()),
            premium_url: PREMIUM_URL.to_string(),
            priority: config.priority.unwrap_or(Self::DEFAULT_PRIORITY),
            cooldown: config.cooldown_or(Some(Self::DEFAULT_COOLDOWN)),
        }
    }

    pub fn with_premium_url(mut self, url: impl Into<String>) -> Self {
        self.premium_url = url.into();
        self
    }
}

// Jina has answered with a bare array, {"data": [...]} and {"results": [...]}
fn result_array(json: &Value) -> Option<&Vec<Value>> {
    json.as_array()
        .or_else(|| json["data"].as_array())
        .or_else(|| json["results"].as_array())
}

fn parse_results(json: &Value, count: usize) -> Vec<SearchResult> {
    let Some(raw) = result_array(json) else {
        return Vec::new();
    };

    raw.iter()
        .filter_map(|item| {
            let url = Some(str_field(item, "url"))
                .filter(|u| !u.is_empty())
                .or_else(|| Some(str_field(item, "link")).filter(|u| !u.is_empty()))?;
            let snippet = Some(str_field(item, "description"))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| str_field(item, "snippet"));
            let title = Some(str_field(item, "title"))
                .filter(|t| !t.is_empty())
                .unwrap_or("No title");
            Some(SearchResult::new(title, url, snippet))
        })
        .take(count)
        .collect()
}

#[async_trait::async_trait]
impl SearchProvider for JinaSearchProvider {
    fn name(&self) -> &str {
        "jina"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn cooldown(&self) -> Option<Duration> {
        self.cooldown
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchResult>, SearchError> {
        let Some(api_key) = &self.api_key else {
            return Err(SearchError::InvalidApiKey);
        };

        tracing::debug!(query = %query, count, "performing jina search");

        let client = self.pool.client()?;
        let request = if count > BASIC_LIMIT {
            client
                .post(&self.premium_url)
                .bearer_auth(api_key)
                .json(&json!({"query": query, "num": count.min(PREMIUM_LIMIT)}))
        } else {
            client
                .get(&self.base_url)
                .bearer_auth(api_key)
                .header("Accept", "application/json")
                .header("X-Respond-With", "no-content")
                .query(&[("q", query)])
        };
        let json = read_json(self.name(), self.pool.execute(request).await?).await?;

        let items = parse_results(&json, count);
        tracing::debug!(result_count = items.len(), "jina search completed");
        Ok(items)
    }
}
