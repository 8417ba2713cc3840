use super::{read_json, str_field};
use crate::config::EngineConfig;
use crate::search::{SearchError, SearchProvider, SearchResult};
use crate::transport::ConnectionPool;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_URL: &str = "https://api.search.brave.com/res/v1/web/search";

/// Brave Search API provider
///
/// Free tier: 2000 requests/month
/// Documentation: https://brave.com/search/api/
pub struct BraveSearchProvider {
    pool: Arc<ConnectionPool>,
    api_key: Option<String>,
    base_url: String,
    priority: u32,
    cooldown: Option<Duration>,
}

impl BraveSearchProvider {
    pub const DEFAULT_PRIORITY: u32 = 25;

    pub fn new(pool: Arc<ConnectionPool>, config: &EngineConfig) -> Self {
        Self {
            pool,
            api_key: config.key().map(str::to_string),
            base_url: config.base_url.clone().unwrap_or_else(|| DEFAULT_URL.to_string()),
            priority: config.priority.unwrap_or(Self::DEFAULT_PRIORITY),
            cooldown: config.cooldown_or(None),
        }
    }
}

#[async_trait::async_trait]
impl SearchProvider for BraveSearchProvider {
    fn name(&self) -> &str {
        "brave"
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

        let count_param = count.clamp(1, 20).to_string();
        tracing::debug!(query = %query, max_results = count, "performing brave search");

        let request = self
            .pool
            .client()?
            .get(&self.base_url)
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .query(&[("q", query), ("count", count_param.as_str())]);
        let json = read_json(self.name(), self.pool.execute(request).await?).await?;

        let mut items = Vec::new();
        if let Some(web_results) = json["web"]["results"].as_array() {
            for result in web_results {
                let url = str_field(result, "url");
                if url.is_empty() {
                    continue;
                }

                items.push(SearchResult::new(
                    str_field(result, "title"),
                    url,
                    str_field(result, "description"),
                ));

                // Stop once we have enough results
                if items.len() >= count {
                    break;
                }
            }
        }

        tracing::debug!(result_count = items.len(), "brave search completed");
        Ok(items)
    }
}
