use super::base::{Tool, ToolContext, ToolError, ToolResult};
use crate::search::Dispatcher;
use serde_json::json;
use std::sync::Arc;

/// Engine status tool - health, cooldowns and dispatch statistics
pub struct EnginesTool {
    dispatcher: Arc<Dispatcher>,
}

impl EnginesTool {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait::async_trait]
impl Tool for EnginesTool {
    fn id(&self) -> &str {
        "get_available_engines"
    }

    fn description(&self) -> &str {
        "List configured search engines with priority, credential state, \
         success/error counts and cooldown status, plus overall search statistics."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(
        &self,
        _params: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let engines = self.dispatcher.engine_statuses();
        let stats = self.dispatcher.stats();
        let available = engines.iter().filter(|e| e.available).count();

        tracing::debug!(engines = engines.len(), available, "engine status retrieved");

        let body = json!({
            "engines": engines,
            "stats": stats,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        Ok(ToolResult::json(
            format!("{available} of {} engines available", engines.len()),
            &body,
        )
        .with_metadata("available", json!(available)))
    }
}
