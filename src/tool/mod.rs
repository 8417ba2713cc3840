pub mod base;
pub mod context;
pub mod engines;
pub mod wayback;
pub mod web_fetch;
pub mod web_search;
pub mod wikipedia;

use crate::service::SearchService;
use base::Tool;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// Tool registry - manages all available tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Register every tool backed by `service`
    pub fn from_service(service: &SearchService) -> Self {
        let mut registry = Self {
            tools: HashMap::new(),
        };

        // Search path
        registry.register(Arc::new(web_search::WebSearchTool::new(service.dispatcher().clone())));
        registry.register(Arc::new(engines::EnginesTool::new(service.dispatcher().clone())));

        // Fetch-and-read path
        registry.register(Arc::new(web_fetch::WebFetchTool::new(service.fetcher().clone())));

        // Reference lookups
        registry.register(Arc::new(wikipedia::WikipediaTool::new(service.pool().clone())));
        registry.register(Arc::new(wayback::WaybackTool::new(service.pool().clone())));

        registry
    }

    fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.id().to_string(), tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Tool definitions (name, description, input schema), sorted by name
    pub fn list_tool_definitions(&self) -> Vec<serde_json::Value> {
        let mut tools: Vec<_> = self.tools.values().collect();
        tools.sort_by(|a, b| a.id().cmp(b.id()));
        tools
            .into_iter()
            .map(|tool| {
                json!({
                    "name": tool.id(),
                    "description": tool.description(),
                    "input_schema": tool.input_schema(),
                })
            })
            .collect()
    }

    /// Get all tool names
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
