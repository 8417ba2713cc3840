use super::{read_json, str_field};
use crate::config::EngineConfig;
use crate::search::{SearchError, SearchProvider, SearchResult};
use crate::transport::ConnectionPool;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_URL: &str = "https://google.serper.dev/search";

/// Serper.dev Google results API
pub struct SerperSearchProvider {
    pool: Arc<ConnectionPool>,
    api_key: Option<String>,
    base_url: String,
    priority: u32,
    cooldown: Option<Duration>,
}

impl SerperSearchProvider {
    pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);
    pub const DEFAULT_PRIORITY: u32 = 10;

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

/// Knowledge graph first (when it links somewhere), then organic results
fn parse_results(json: &Value, count: usize) -> Vec<SearchResult> {
    let mut items = Vec::new();

    let graph = &json["knowledgeGraph"];
    let website = str_field(graph, "website");
    if !website.is_empty() {
        items.push(SearchResult::new(
            str_field(graph, "title"),
            website,
            str_field(graph, "description"),
        ));
    }

    if let Some(organic) = json["organic"].as_array() {
        items.extend(
            organic
                .iter()
                .filter(|item| !str_field(item, "link").is_empty())
                .map(|item| {
                    SearchResult::new(
                        str_field(item, "title"),
                        str_field(item, "link"),
                        str_field(item, "snippet"),
                    )
                }),
        );
    }

    items.truncate(count);
    items
}

#[async_trait::async_trait]
impl SearchProvider for SerperSearchProvider {
    fn name(&self) -> &str {
        "serper"
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

        tracing::debug!(query = %query, count, "performing serper search");

        let request = self
            .pool
            .client()?
            .post(&self.base_url)
            .header("X-API-KEY", api_key)
            .json(&json!({
                "q": query,
                "num": count.clamp(1, 100),
                "autocorrect": false,
            }));
        let json = read_json(self.name(), self.pool.execute(request).await?).await?;

        let items = parse_results(&json, count);
        tracing::debug!(result_count = items.len(), "serper search completed");
        Ok(items)
    }
}
