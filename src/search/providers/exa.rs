use super::{read_json, str_field};
use crate::config::EngineConfig;
use crate::search::{SearchError, SearchProvider, SearchResult};
use crate::transport::ConnectionPool;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_URL: &str = "https://api.exa.ai/search";
const SNIPPET_CHARS: usize = 300;

/// Exa neural search API
pub struct ExaSearchProvider {
    pool: Arc<ConnectionPool>,
    api_key: Option<String>,
    base_url: String,
    priority: u32,
    cooldown: Option<Duration>,
}

impl ExaSearchProvider {
    pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(120);
    pub const DEFAULT_PRIORITY: u32 = 18;

    pub fn new(pool: Arc<ConnectionPool>, config: &EngineConfig) -> Self {
        Self {
            pool,
            api_key: config.key().map(str::to_string),
            base_url: config.base_url.clone().unwrap_or_else(|| DEFAULT_URL.to_string()),
            priority: config.priority.unwrap_or(Self::DEFAULT_PRIORITY),
            cooldown: config.cooldown_or(Some(Self::DEFAULT_COOLDOWN)),
        }
    }
}

/// First highlight if present, otherwise the start of the page text
fn snippet(item: &Value) -> String {
    if let Some(highlight) = item["highlights"]
        .as_array()
        .and_then(|h| h.first())
        .and_then(Value::as_str)
    {
        return highlight.trim().to_string();
    }
    str_field(item, "text").chars().take(SNIPPET_CHARS).collect::<String>().trim().to_string()
}

fn parse_results(json: &Value, count: usize) -> Vec<SearchResult> {
    json["results"]
        .as_array()
        .map(|results| {
            results
                .iter()
                .filter(|item| !str_field(item, "url").is_empty())
                .map(|item| SearchResult::new(str_field(item, "title"), str_field(item, "url"), snippet(item)))
                .take(count)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl SearchProvider for ExaSearchProvider {
    fn name(&self) -> &str {
        "exa"
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

        tracing::debug!(query = %query, count, "performing exa search");

        let request = self
            .pool
            .client()?
            .post(&self.base_url)
            .header("x-api-key", api_key)
            .json(&json!({
                "query": query,
                "numResults": count.clamp(1, 100),
                "contents": { "text": { "maxCharacters": SNIPPET_CHARS } },
            }));
        let json = read_json(self.name(), self.pool.execute(request).await?).await?;

        let items = parse_results(&json, count);
        tracing::debug!(result_count = items.len(), "exa search completed");
        Ok(items)
    }
}
