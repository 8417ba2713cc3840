use super::base::{parse_params, Tool, ToolContext, ToolError, ToolResult};
use crate::fetch::{FetchOptions, WebFetcher};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

/// Fetch tool - read a web page as text, paginating long documents
pub struct WebFetchTool {
    fetcher: Arc<WebFetcher>,
}

impl WebFetchTool {
    pub fn new(fetcher: Arc<WebFetcher>) -> Self {
        Self { fetcher }
    }
}

fn default_true() -> bool {
    true
}

fn default_page() -> usize {
    1
}

#[derive(Debug, Deserialize)]
struct WebFetchParams {
    url: String,
    #[serde(default = "default_true")]
    use_jina: bool,
    #[serde(default)]
    with_image_alt: bool,
    #[serde(default)]
    max_length: Option<usize>,
    #[serde(default = "default_page")]
    page_number: usize,
    #[serde(default)]
    page_id: Option<String>,
}

#[async_trait::async_trait]
impl Tool for WebFetchTool {
    fn id(&self) -> &str {
        "fetch_url"
    }

    fn description(&self) -> &str {
        "Fetch a URL and return its readable content (markdown or text). \
         Tries Jina Reader, then Serper scrape, then a direct request. \
         Long content is split into pages: the first call returns page 1 with a page_id; \
         request further pages with page_number (and optionally page_id)."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "URL to fetch; https:// is assumed when no scheme is given"
                },
                "use_jina": {
                    "type": "boolean",
                    "default": true,
                    "description": "Try Jina Reader first"
                },
                "with_image_alt": {
                    "type": "boolean",
                    "default": false,
                    "description": "Ask Jina Reader to caption images"
                },
                "max_length": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum characters per page"
                },
                "page_number": {
                    "type": "integer",
                    "minimum": 1,
                    "default": 1,
                    "description": "Page to return"
                },
                "page_id": {
                    "type": "string",
                    "description": "page_id returned by an earlier call"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let params: WebFetchParams = parse_params(params)?;
        if params.page_number == 0 {
            return Err(ToolError::InvalidParams("page_number starts at 1".into()));
        }
        if params.max_length == Some(0) {
            return Err(ToolError::InvalidParams("max_length must be positive".into()));
        }

        tracing::debug!(
            request_id = %ctx.request_id,
            url = %params.url,
            page = params.page_number,
            "fetch_url start"
        );

        let options = FetchOptions {
            use_jina: params.use_jina,
            with_image_alt: params.with_image_alt,
            max_length: params.max_length,
            page_number: params.page_number,
            page_id: params.page_id,
        };

        let started = Instant::now();
        let response = self.fetcher.fetch(&params.url, &options).await?;
        let time_ms = started.elapsed().as_millis() as u64;

        let mut body = serde_json::to_value(&response).map_err(anyhow::Error::from)?;
        body["time_ms"] = json!(time_ms);
        body["is_paginated"] = json!(response.total_pages > 1);
        body["page_info"] = json!(format!("Page {} of {}", response.current_page, response.total_pages));
        if response.current_page < response.total_pages {
            body["next_page_hint"] = json!(format!(
                "Call fetch_url with page_number={} and page_id={} for the next page",
                response.current_page + 1,
                response.page_id.as_deref().unwrap_or_default()
            ));
        }

        Ok(ToolResult::json(format!("Fetched {}", response.url), &body)
            .with_metadata("url", json!(response.url))
            .with_metadata("current_page", json!(response.current_page))
            .with_metadata("total_pages", json!(response.total_pages)))
    }
}
