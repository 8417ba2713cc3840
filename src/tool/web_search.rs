use crate::search::{Dispatcher, ProviderPreference, SearchRequest};
use crate::tool::base::{parse_params, Tool, ToolContext, ToolError, ToolResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

const MAX_RESULTS: usize = 50;

/// Search tool - runs a query through the failover dispatcher
///
/// With `engine = "auto"` every healthy engine is tried in priority order;
/// naming an engine pins the request to it with no fallback.
pub struct WebSearchTool {
    dispatcher: Arc<Dispatcher>,
}

impl WebSearchTool {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

fn default_num_results() -> usize {
    10
}

fn default_engine() -> String {
    "auto".to_string()
}

#[derive(Debug, Deserialize)]
struct WebSearchParams {
    query: String,
    #[serde(default = "default_num_results")]
    num_results: usize,
    #[serde(default = "default_engine")]
    engine: String,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn id(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search the web across multiple engines with automatic failover. \
         Engines are tried in priority order; rate-limited engines are skipped \
         until their cooldown ends. Pass engine to pin one engine (no fallback)."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "minLength": 1,
                    "description": "The search query"
                },
                "num_results": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_RESULTS,
                    "default": 10,
                    "description": "Number of results to return"
                },
                "engine": {
                    "type": "string",
                    "default": "auto",
                    "description": "\"auto\" or one of: google, serper, jina, exa, duckduckgo, brave, bing"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let params: WebSearchParams = parse_params(params)?;

        if params.query.trim().is_empty() {
            return Err(ToolError::InvalidParams("query cannot be empty".into()));
        }

        let count = params.num_results.clamp(1, MAX_RESULTS);
        let preference = ProviderPreference::parse(&params.engine);
        let request = SearchRequest::new(params.query.trim(), count).with_preference(preference.clone());

        tracing::debug!(
            request_id = %ctx.request_id,
            query = %params.query,
            engine = %preference,
            count,
            "search tool start"
        );

        let started = Instant::now();
        let result = self.dispatcher.dispatch(request).await?;
        let time_ms = started.elapsed().as_millis() as u64;

        let results: Vec<serde_json::Value> = result
            .items
            .iter()
            .map(|item| {
                json!({
                    "title": item.title,
                    "link": item.url,
                    "snippet": item.snippet,
                    "source": result.provider,
                })
            })
            .collect();

        let body = json!({
            "query": params.query.trim(),
            "engine": result.provider,
            "requested_engine": preference.to_string(),
            "time_ms": time_ms,
            "num_results": results.len(),
            "results": results,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        Ok(ToolResult::json(
            format!("{} results from {}", result.items.len(), result.provider),
            &body,
        )
        .with_metadata("engine", json!(result.provider))
        .with_metadata("num_results", json!(result.items.len()))
        .with_metadata("latency_ms", json!(result.latency.as_millis() as u64)))
    }
}
