//! Fetch-and-read path: turn a URL into readable text, paginating large
//! documents through [`ContentPaginator`].
//!
//! Methods are tried in order: Jina Reader, Serper scrape (when a key is
//! configured), then a direct GET with local HTML to text conversion.

pub mod paginator;

pub use paginator::{split_into_pages, ContentPaginator, PageError, StoredPages};

use crate::config::{EnginesConfig, FetchSettings};
use crate::transport::{ConnectionPool, TransportError};
use anyhow::{bail, Context};
use scraper::{Html, Selector};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const JINA_READER_URL: &str = "https://r.jina.ai/";
const SERPER_SCRAPE_URL: &str = "https://scrape.serper.dev";
const TEXT_WIDTH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMethod {
    Jina,
    Serper,
    Direct,
    /// Served from the page cache
    Cache,
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub use_jina: bool,
    /// Ask Jina to caption images that have no alt text
    pub with_image_alt: bool,
    /// Page length override, in characters
    pub max_length: Option<usize>,
    /// 1-based; pages after the first come from the cache
    pub page_number: usize,
    pub page_id: Option<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            use_jina: true,
            with_image_alt: false,
            max_length: None,
            page_number: 1,
            page_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResponse {
    pub url: String,
    pub method: FetchMethod,
    /// "markdown" or "text"
    pub format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub content: String,
    pub current_page: usize,
    pub total_pages: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("all fetch methods failed for {url}: {}", .errors.join("; "))]
    AllMethodsFailed { url: String, errors: Vec<String> },

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Page(#[from] PageError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

struct Fetched {
    content: String,
    method: FetchMethod,
    format: &'static str,
    title: Option<String>,
}

pub struct WebFetcher {
    pool: Arc<ConnectionPool>,
    paginator: Arc<ContentPaginator>,
    jina_key: Option<String>,
    serper_key: Option<String>,
    jina_reader_url: String,
    serper_scrape_url: String,
    timeout: Duration,
}

impl WebFetcher {
    pub fn new(
        pool: Arc<ConnectionPool>,
        paginator: Arc<ContentPaginator>,
        settings: &FetchSettings,
        engines: &EnginesConfig,
    ) -> Self {
        Self {
            pool,
            paginator,
            jina_key: engines.jina.key().map(str::to_string),
            serper_key: engines.serper.key().map(str::to_string),
            jina_reader_url: settings
                .jina_reader_url
                .clone()
                .unwrap_or_else(|| JINA_READER_URL.to_string()),
            serper_scrape_url: settings
                .serper_scrape_url
                .clone()
                .unwrap_or_else(|| SERPER_SCRAPE_URL.to_string()),
            timeout: Duration::from_secs(settings.fetch_timeout_secs),
        }
    }

    pub fn paginator(&self) -> &Arc<ContentPaginator> {
        &self.paginator
    }

    pub async fn fetch(&self, raw_url: &str, options: &FetchOptions) -> Result<FetchResponse, FetchError> {
        let url = normalize_url(raw_url)?;

        if options.page_number > 1 || options.page_id.is_some() {
            return self.cached_page(&url, options);
        }

        tracing::debug!(url = %url, use_jina = options.use_jina, "fetch start");

        let fetched = tokio::time::timeout(self.timeout, self.fetch_content(&url, options))
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))??;

        let max_length = options.max_length.unwrap_or(self.paginator.max_length()).max(1);
        let length = fetched.content.chars().count();

        tracing::info!(
            url = %url,
            method = ?fetched.method,
            content_len = length,
            "fetch complete"
        );

        if length <= max_length {
            return Ok(FetchResponse {
                url,
                method: fetched.method,
                format: fetched.format,
                title: fetched.title,
                content: fetched.content,
                current_page: 1,
                total_pages: 1,
                page_id: None,
            });
        }

        let stored = self
            .paginator
            .store_with(&fetched.content, max_length, Some(&url));

        Ok(FetchResponse {
            url,
            method: fetched.method,
            format: fetched.format,
            title: fetched.title,
            content: stored.first_page,
            current_page: 1,
            total_pages: stored.total_pages,
            page_id: Some(stored.page_id),
        })
    }

    fn cached_page(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse, FetchError> {
        let (page_id, total_pages) = match &options.page_id {
            Some(id) => (id.clone(), self.paginator.total_pages(id)?),
            None => self
                .paginator
                .find_by_source(url)
                .ok_or_else(|| PageError::NotFound(url.to_string()))?,
        };
        let page_number = options.page_number;
        let content = self.paginator.get_page(&page_id, page_number)?;

        Ok(FetchResponse {
            url: url.to_string(),
            method: FetchMethod::Cache,
            format: "text",
            title: None,
            content,
            current_page: page_number,
            total_pages,
            page_id: Some(page_id),
        })
    }

    async fn fetch_content(&self, url: &str, options: &FetchOptions) -> Result<Fetched, FetchError> {
        let mut errors = Vec::new();

        if options.use_jina {
            match self.fetch_with_jina(url, options.with_image_alt).await {
                Ok(fetched) => return Ok(fetched),
                Err(e) => {
                    tracing::warn!(url = %url, error = %format!("{e:#}"), "jina reader failed");
                    errors.push(format!("jina: {e:#}"));
                }
            }
        }

        if self.serper_key.is_some() {
            match self.fetch_with_serper(url).await {
                Ok(fetched) => return Ok(fetched),
                Err(e) => {
                    tracing::warn!(url = %url, error = %format!("{e:#}"), "serper scrape failed");
                    errors.push(format!("serper: {e:#}"));
                }
            }
        }

        match self.fetch_direct(url).await {
            Ok(fetched) => Ok(fetched),
            Err(e) => {
                tracing::warn!(url = %url, error = %format!("{e:#}"), "direct fetch failed");
                errors.push(format!("direct: {e:#}"));
                Err(FetchError::AllMethodsFailed {
                    url: url.to_string(),
                    errors,
                })
            }
        }
    }

    async fn fetch_with_jina(&self, url: &str, with_image_alt: bool) -> anyhow::Result<Fetched> {
        let mut request = self
            .pool
            .client()?
            .post(&self.jina_reader_url)
            .header("Accept", "text/plain")
            .header("X-With-Links-Summary", "all")
            .header("X-Retain-Images", "none")
            .header("X-Respond-With", "markdown")
            .json(&json!({ "url": url }));
        if with_image_alt {
            request = request.header("X-With-Generated-Alt", "true");
        }
        if let Some(key) = &self.jina_key {
            request = request.bearer_auth(key);
        }

        let response = self.pool.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {status}");
        }

        let content = response.text().await?;
        if content.trim().is_empty() {
            bail!("empty content");
        }

        Ok(Fetched {
            content,
            method: FetchMethod::Jina,
            format: "markdown",
            title: None,
        })
    }

    async fn fetch_with_serper(&self, url: &str) -> anyhow::Result<Fetched> {
        let key = self.serper_key.as_deref().context("no serper key")?;
        let request = self
            .pool
            .client()?
            .post(&self.serper_scrape_url)
            .header("X-API-KEY", key)
            .json(&json!({ "url": url, "includeMarkdown": true }));

        let response = self.pool.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {status}");
        }

        let data: serde_json::Value = response.json().await?;
        let markdown = data["markdown"].as_str().filter(|s| !s.trim().is_empty());
        let (content, format) = match markdown {
            Some(md) => (md, "markdown"),
            None => (data["text"].as_str().unwrap_or(""), "text"),
        };
        if content.trim().is_empty() {
            bail!("empty content");
        }

        Ok(Fetched {
            content: content.to_string(),
            method: FetchMethod::Serper,
            format,
            title: data["metadata"]["title"].as_str().map(str::to_string),
        })
    }

    async fn fetch_direct(&self, url: &str) -> anyhow::Result<Fetched> {
        let request = self.pool.client()?.get(url);
        let response = self.pool.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {status}");
        }

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"));
        let body = response.text().await?;

        if !is_html {
            return Ok(Fetched {
                content: body,
                method: FetchMethod::Direct,
                format: "text",
                title: None,
            });
        }

        let title = extract_title(&body);
        let content = html2text::from_read(body.as_bytes(), TEXT_WIDTH);
        if content.trim().is_empty() {
            bail!("page has no readable text");
        }

        Ok(Fetched {
            content,
            method: FetchMethod::Direct,
            format: "markdown",
            title,
        })
    }
}

/// Trim, default to https, and accept only http(s) URLs
pub fn normalize_url(raw: &str) -> Result<String, FetchError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FetchError::InvalidUrl("URL must not be empty".to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let parsed = Url::parse(&candidate).map_err(|e| FetchError::InvalidUrl(format!("{trimmed}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed.to_string()),
        scheme => Err(FetchError::InvalidUrl(format!(
            "{trimmed}: unsupported scheme {scheme:?}"
        ))),
    }
}

fn extract_title(html: &str) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    Html::parse_document(html)
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}
