use super::{read_json, str_field};
use crate::config::EngineConfig;
use crate::search::{SearchError, SearchProvider, SearchResult};
use crate::transport::ConnectionPool;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_URL: &str = "https://api.bing.microsoft.com/v7.0/search";

/// Bing Web Search v7
pub struct BingSearchProvider {
    pool: Arc<ConnectionPool>,
    api_key: Option<String>,
    base_url: String,
    priority: u32,
    cooldown: Option<Duration>,
}

impl BingSearchProvider {
    pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);
    pub const DEFAULT_PRIORITY: u32 = 30;

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

#[async_trait::async_trait]
impl SearchProvider for BingSearchProvider {
    fn name(&self) -> &str {
        "bing"
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

        let count_param = count.clamp(1, 50).to_string();
        tracing::debug!(query = %query, count, "performing bing search");

        let request = self
            .pool
            .client()?
            .get(&self.base_url)
            .header("Ocp-Apim-Subscription-Key", api_key)
            .header("Accept", "application/json")
            .query(&[
                ("q", query),
                ("count", count_param.as_str()),
                ("offset", "0"),
                ("mkt", "en-US"),
                ("safesearch", "Moderate"),
            ]);
        let json = read_json(self.name(), self.pool.execute(request).await?).await?;

        let items: Vec<SearchResult> = json["webPages"]["value"]
            .as_array()
            .map(|pages| {
                pages
                    .iter()
                    .filter(|page| !str_field(page, "url").is_empty())
                    .map(|page| {
                        SearchResult::new(
                            str_field(page, "name"),
                            str_field(page, "url"),
                            str_field(page, "snippet"),
                        )
                    })
                    .take(count)
                    .collect()
            })
            .unwrap_or_default();

        tracing::debug!(result_count = items.len(), "bing search completed");
        Ok(items)
    }
}
