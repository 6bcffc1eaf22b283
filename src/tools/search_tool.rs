//! The synthetic search tool: the one tool always advertised to the
//! model. Invoking it queries the session's retriever; the reply is a
//! JSON array of matching tool names in score-descending order.
//!
//! Names are all the model needs: the interceptor promotes them to
//! callable tools on the next turn. Summaries and scores stay
//! server-side.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::ToolCallback;
use crate::llm::types::ToolDefinition;
use crate::retriever::{ToolRetriever, ToolSearchRequest};

/// Declared input schema for the search tool.
pub fn search_tool_definition(name: &str, default_max_results: usize) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: "Search the catalog of currently hidden tools by capability. \
            Returns the names of the most relevant tools; each returned tool becomes \
            directly callable on the next turn."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Natural-language description of the needed capability"
                },
                "maxResults": {
                    "type": "integer",
                    "description": format!(
                        "Maximum number of tool names to return (1-10, default {default_max_results})"
                    ),
                    "minimum": 1,
                    "maximum": 10
                },
                "categoryFilter": {
                    "type": "string",
                    "description": "Optional category to restrict the search to"
                }
            },
            "required": ["query"]
        }),
    }
}

/// Bridges a model invocation into the retriever for one session.
/// Holds no mutable state; safe to share across turns.
pub struct SearchToolCallback {
    definition: ToolDefinition,
    retriever: Arc<dyn ToolRetriever>,
    session_id: String,
    default_max_results: usize,
}

impl SearchToolCallback {
    pub fn new(
        name: &str,
        retriever: Arc<dyn ToolRetriever>,
        session_id: impl Into<String>,
        default_max_results: usize,
    ) -> Self {
        Self {
            definition: search_tool_definition(name, default_max_results),
            retriever,
            session_id: session_id.into(),
            default_max_results,
        }
    }
}

#[async_trait]
impl ToolCallback for SearchToolCallback {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn call(&self, input: &serde_json::Value) -> anyhow::Result<String> {
        let query = input
            .get("query")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let max_results = input
            .get("maxResults")
            .and_then(|v| v.as_i64())
            .unwrap_or(self.default_max_results as i64);
        let category_filter = input
            .get("categoryFilter")
            .and_then(|v| v.as_str())
            .map(String::from);

        let request = ToolSearchRequest {
            session_id: self.session_id.clone(),
            query,
            max_results: Some(max_results),
            category_filter,
        };

        let response = self.retriever.find_tools(&request).await?;
        if let Some(warning) = &response.metadata.warning {
            debug!(warning = %warning, "tool search degraded to empty result");
        }

        let names: Vec<&str> = response
            .tool_references
            .iter()
            .map(|r| r.tool_name.as_str())
            .collect();
        Ok(serde_json::to_string(&names)?)
    }
}
