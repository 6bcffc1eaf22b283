pub mod search_tool;

use async_trait::async_trait;

use crate::llm::types::ToolDefinition;

/// An invocable binding of a tool definition to its implementation.
///
/// The middleware advertises callbacks to the model and invokes them when
/// the model emits a matching tool_use block. Implementations live outside
/// this crate; handles are shared as `Arc<dyn ToolCallback>`.
#[async_trait]
pub trait ToolCallback: Send + Sync {
    fn definition(&self) -> &ToolDefinition;

    async fn call(&self, input: &serde_json::Value) -> anyhow::Result<String>;
}

/// Result of executing a tool: content string and whether it was an error.
pub struct ToolExecutionResult {
    pub content: String,
    pub is_error: bool,
}

/// A `ToolCallback` built from a plain function or closure. Handy for
/// small tools and for tests.
pub struct FunctionTool {
    definition: ToolDefinition,
    handler: Box<dyn Fn(&serde_json::Value) -> anyhow::Result<String> + Send + Sync>,
}

impl FunctionTool {
    pub fn new(
        definition: ToolDefinition,
        handler: impl Fn(&serde_json::Value) -> anyhow::Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            definition,
            handler: Box::new(handler),
        }
    }

    /// Shorthand for a tool whose schema is an empty object and whose
    /// implementation ignores its input.
    pub fn simple(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: impl Fn(&serde_json::Value) -> anyhow::Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self::new(
            ToolDefinition {
                name: name.into(),
                description: description.into(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {}
                }),
            },
            handler,
        )
    }
}

#[async_trait]
impl ToolCallback for FunctionTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn call(&self, input: &serde_json::Value) -> anyhow::Result<String> {
        (self.handler)(input)
    }
}
