//! DuckDuckGo through its HTML-only endpoint; no key needed.

use super::classify_status;
use crate::config::EngineConfig;
use crate::search::{SearchError, SearchProvider, SearchResult};
use crate::transport::ConnectionPool;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const DEFAULT_URL: &str = "https://html.duckduckgo.com/html/";

pub struct DuckDuckGoSearchProvider {
    pool: Arc<ConnectionPool>,
    base_url: String,
    priority: u32,
    cooldown: Option<Duration>,
}

impl DuckDuckGoSearchProvider {
    pub const DEFAULT_PRIORITY: u32 = 20;

    pub fn new(pool: Arc<ConnectionPool>, config: &EngineConfig) -> Self {
        Self {
            pool,
            base_url: config.base_url.clone().unwrap_or_else(|| DEFAULT_URL.to_string()),
            priority: config.priority.unwrap_or(Self::DEFAULT_PRIORITY),
            cooldown: config.cooldown_or(None),
        }
    }
}

/// Unwrap `//duckduckgo.com/l/?uddg=<encoded>&rut=...` redirect links
fn extract_url(href: &str) -> Option<String> {
    let full = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };

    let parsed = Url::parse(&full).ok()?;
    if parsed.host_str() == Some("duckduckgo.com") && parsed.path().starts_with("/l/") {
        parsed
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, value)| value.into_owned())
    } else {
        Some(full)
    }
}

fn selector(css: &str) -> Result<Selector, SearchError> {
    Selector::parse(css).map_err(|e| SearchError::Parse(format!("invalid selector {css:?}: {e:?}")))
}

pub(crate) fn parse_html(html: &str, count: usize) -> Result<Vec<SearchResult>, SearchError> {
    let document = Html::parse_document(html);
    let result_sel = selector(".result:not(.result--ad), .web-result:not(.result--ad)")?;
    let title_sel = selector(".result__a")?;
    let snippet_sel = selector(".result__snippet")?;

    let mut items: Vec<SearchResult> = Vec::new();
    for element in document.select(&result_sel) {
        let Some(link) = element.select(&title_sel).next() else {
            continue;
        };
        let title = link.text().collect::<String>().trim().to_string();
        let Some(url) = link.value().attr("href").and_then(extract_url) else {
            continue;
        };
        if title.is_empty() || items.iter().any(|i| i.url == url) {
            continue;
        }

        let snippet = element
            .select(&snippet_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        items.push(SearchResult::new(title, url, snippet));
        if items.len() >= count {
            break;
        }
    }

    Ok(items)
}

#[async_trait::async_trait]
impl SearchProvider for DuckDuckGoSearchProvider {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn cooldown(&self) -> Option<Duration> {
        self.cooldown
    }

    fn requires_credential(&self) -> bool {
        false
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchResult>, SearchError> {
        tracing::debug!(query = %query, count, "performing duckduckgo search");

        let request = self
            .pool
            .client()?
            .post(&self.base_url)
            .header("Accept-Language", "en-US,en;q=0.9")
            .form(&[("q", query), ("kp", "-1")]);
        let response = self.pool.execute(request).await?;

        let status = response.status();
        let body = response.text().await?;
        // DuckDuckGo throttles with 202 and an anomaly page
        if status.as_u16() == 202 || body.contains("anomaly-modal") {
            return Err(SearchError::RateLimitExceeded);
        }
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let items = parse_html(&body, count)?;
        tracing::debug!(result_count = items.len(), "duckduckgo search completed");
        Ok(items)
    }
}
