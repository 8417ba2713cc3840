use super::base::{parse_params, Tool, ToolContext, ToolError, ToolResult};
use crate::transport::ConnectionPool;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const DEFAULT_BASE_URL: &str = "https://en.wikipedia.org";
const SUGGESTION_LIMIT: usize = 5;
const OPTION_LIMIT: usize = 10;

/// Wikipedia lookup tool (MediaWiki action API)
pub struct WikipediaTool {
    pool: Arc<ConnectionPool>,
    base_url: String,
}

impl WikipediaTool {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self::with_base_url(pool, DEFAULT_BASE_URL)
    }

    /// Point at another wiki (or a mock server)
    pub fn with_base_url(pool: Arc<ConnectionPool>, base_url: impl Into<String>) -> Self {
        Self {
            pool,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn api(&self, query: &[(&str, &str)]) -> Result<Value, ToolError> {
        let upstream = |message: String| ToolError::Upstream {
            service: "wikipedia",
            message,
        };

        let client = self.pool.client().map_err(|e| upstream(e.to_string()))?;
        let request = client
            .get(format!("{}/w/api.php", self.base_url))
            .query(&[("format", "json")])
            .query(query);
        let response = self
            .pool
            .execute(request)
            .await
            .map_err(|e| upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(upstream(format!("HTTP {status}")));
        }
        response.json::<Value>().await.map_err(|e| upstream(e.to_string()))
    }

    async fn suggestions(&self, entity: &str) -> Result<Vec<String>, ToolError> {
        let limit = SUGGESTION_LIMIT.to_string();
        let data = self
            .api(&[
                ("action", "opensearch"),
                ("search", entity),
                ("limit", limit.as_str()),
                ("namespace", "0"),
            ])
            .await?;
        Ok(string_list(&data[1], |v| v.as_str()))
    }

    async fn disambiguation_options(&self, title: &str) -> Result<Vec<String>, ToolError> {
        let data = self
            .api(&[
                ("action", "query"),
                ("formatversion", "2"),
                ("prop", "links"),
                ("titles", title),
                ("plnamespace", "0"),
                ("pllimit", "50"),
            ])
            .await?;
        let mut options = string_list(&data["query"]["pages"][0]["links"], |v| v["title"].as_str());
        options.truncate(OPTION_LIMIT);
        Ok(options)
    }
}

fn string_list(value: &Value, pick: impl Fn(&Value) -> Option<&str>) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(|v| pick(v).map(str::to_string)).collect())
        .unwrap_or_default()
}

/// First `n` sentences of `text`; `n == 0` keeps everything
pub(crate) fn first_sentences(text: &str, n: usize) -> String {
    if n == 0 {
        return text.trim().to_string();
    }

    let mut seen = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let terminal = match c {
            '。' | '！' | '？' => true,
            '.' | '!' | '?' => chars.peek().map_or(true, |(_, next)| next.is_whitespace()),
            _ => false,
        };
        if terminal {
            seen += 1;
            if seen == n {
                return text[..i + c.len_utf8()].trim().to_string();
            }
        }
    }
    text.trim().to_string()
}

fn default_sentences() -> usize {
    10
}

#[derive(Debug, Deserialize)]
struct WikipediaParams {
    entity: String,
    #[serde(default = "default_sentences")]
    first_sentences: usize,
}

#[async_trait::async_trait]
impl Tool for WikipediaTool {
    fn id(&self) -> &str {
        "search_wikipedia"
    }

    fn description(&self) -> &str {
        "Look up an entity on Wikipedia. Returns the page title, URL and the first \
         sentences of the article (first_sentences=0 for the full text). Ambiguous \
         names return the candidate pages; unknown names return similar titles."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "entity": {
                    "type": "string",
                    "description": "Entity or page title to look up"
                },
                "first_sentences": {
                    "type": "integer",
                    "minimum": 0,
                    "default": 10,
                    "description": "Number of leading sentences to return, 0 for full content"
                }
            },
            "required": ["entity"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let params: WikipediaParams = parse_params(params)?;
        let entity = params.entity.trim();
        if entity.is_empty() {
            return Err(ToolError::InvalidParams("entity cannot be empty".into()));
        }

        tracing::debug!(request_id = %ctx.request_id, entity = %entity, "wikipedia lookup");

        let data = self
            .api(&[
                ("action", "query"),
                ("formatversion", "2"),
                ("redirects", "1"),
                ("prop", "extracts|pageprops|info"),
                ("inprop", "url"),
                ("explaintext", "1"),
                ("titles", entity),
            ])
            .await?;
        let page = &data["query"]["pages"][0];

        if page.is_null() || page["missing"].as_bool().unwrap_or(false) || page["invalid"].as_bool().unwrap_or(false) {
            let suggestions = self.suggestions(entity).await?;
            tracing::info!(entity = %entity, suggestions = suggestions.len(), "wikipedia page not found");
            let body = json!({
                "entity": entity,
                "status": "not_found",
                "suggestions": suggestions,
                "message": if suggestions.is_empty() {
                    format!("No Wikipedia page found for '{entity}'")
                } else {
                    format!("No exact page for '{entity}'; try one of the suggestions")
                },
            });
            return Ok(ToolResult::json(format!("No Wikipedia page for {entity}"), &body)
                .with_metadata("status", json!("not_found")));
        }

        let title = page["title"].as_str().unwrap_or(entity).to_string();

        if !page["pageprops"]["disambiguation"].is_null() {
            let options = self.disambiguation_options(&title).await?;
            let body = json!({
                "entity": entity,
                "status": "disambiguation",
                "title": title,
                "options": options,
                "message": format!("'{entity}' refers to several pages; pick one of the options"),
            });
            return Ok(ToolResult::json(format!("{title} is ambiguous"), &body)
                .with_metadata("status", json!("disambiguation")));
        }

        let extract = page["extract"].as_str().unwrap_or("");
        let summary = first_sentences(extract, params.first_sentences);
        let url = page["fullurl"].as_str().map(str::to_string).unwrap_or_else(|| {
            format!("{}/wiki/{}", self.base_url, title.replace(' ', "_"))
        });

        let body = json!({
            "entity": entity,
            "status": "found",
            "title": title,
            "url": url,
            "summary": summary,
            "content_length": extract.chars().count(),
        });

        Ok(ToolResult::json(format!("Wikipedia: {title}"), &body)
            .with_metadata("status", json!("found"))
            .with_metadata("url", json!(url)))
    }
}
