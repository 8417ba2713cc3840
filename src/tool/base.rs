use crate::fetch::FetchError;
use crate::search::DispatchError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-call information handed to every tool
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Correlates a tool call's log lines
    pub request_id: String,
}

/// Tool execution result returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Human-readable title/summary
    pub title: String,
    /// Tool output content (pretty JSON for every search tool)
    pub output: String,
    /// Additional metadata (engine used, page info, timings)
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ToolResult {
    pub fn new(title: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            output: output.into(),
            metadata: HashMap::new(),
        }
    }

    /// Result whose output is `value` rendered as pretty JSON
    pub fn json(title: impl Into<String>, value: &serde_json::Value) -> Self {
        let output = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        Self::new(title, output)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Tool execution errors
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Search failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("{service} request failed: {message}")]
    Upstream { service: &'static str, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Base tool trait - all tools must implement this
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool identifier (e.g., "search", "fetch_url")
    fn id(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// JSON schema for tool parameters
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with given parameters
    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError>;
}

/// Deserialize tool parameters, mapping failures to `InvalidParams`
pub(crate) fn parse_params<T: serde::de::DeserializeOwned>(params: serde_json::Value) -> Result<T, ToolError> {
    serde_json::from_value(params).map_err(|e| ToolError::InvalidParams(e.to_string()))
}
