use super::{read_json, str_field};
use crate::config::EngineConfig;
use crate::search::{SearchError, SearchProvider, SearchResult};
use crate::transport::ConnectionPool;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// Google Programmable Search (Custom Search JSON API)
///
/// Needs both an API key and a search engine id (`cse_id`).
/// The API returns at most 10 results per call.
pub struct GoogleSearchProvider {
    pool: Arc<ConnectionPool>,
    api_key: Option<String>,
    cse_id: Option<String>,
    base_url: String,
    priority: u32,
    cooldown: Option<Duration>,
}

impl GoogleSearchProvider {
    pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);
    pub const DEFAULT_PRIORITY: u32 = 10;

    pub fn new(pool: Arc<ConnectionPool>, config: &EngineConfig) -> Self {
        Self {
            pool,
            api_key: config.key().map(str::to_string),
            cse_id: config
                .cse_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
            base_url: config.base_url.clone().unwrap_or_else(|| DEFAULT_URL.to_string()),
            priority: config.priority.unwrap_or(Self::DEFAULT_PRIORITY),
            cooldown: config.cooldown_or(Some(Self::DEFAULT_COOLDOWN)),
        }
    }
}

#[async_trait::async_trait]
impl SearchProvider for GoogleSearchProvider {
    fn name(&self) -> &str {
        "google"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn cooldown(&self) -> Option<Duration> {
        self.cooldown
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some() && self.cse_id.is_some()
    }

    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchResult>, SearchError> {
        let (Some(api_key), Some(cse_id)) = (&self.api_key, &self.cse_id) else {
            return Err(SearchError::InvalidApiKey);
        };

        let num = count.clamp(1, 10).to_string();
        tracing::debug!(query = %query, num = %num, "performing google search");

        let request = self.pool.client()?.get(&self.base_url).query(&[
            ("key", api_key.as_str()),
            ("cx", cse_id.as_str()),
            ("q", query),
            ("num", num.as_str()),
            ("safe", "active"),
            ("fields", "items(title,link,snippet)"),
        ]);
        let json = read_json(self.name(), self.pool.execute(request).await?).await?;

        let items: Vec<SearchResult> = json["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter(|item| !str_field(item, "link").is_empty())
                    .map(|item| {
                        SearchResult::new(
                            str_field(item, "title"),
                            str_field(item, "link"),
                            str_field(item, "snippet"),
                        )
                    })
                    .take(count)
                    .collect()
            })
            .unwrap_or_default();

        tracing::debug!(result_count = items.len(), "google search completed");
        Ok(items)
    }
}
