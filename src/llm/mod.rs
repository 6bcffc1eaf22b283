//! The seam between the interceptor and the LLM client.
//!
//! The interceptor never talks to a concrete API; it hands a rewritten
//! request to whatever `ChatTransport` the application wired in.

pub mod types;

use async_trait::async_trait;
use serde::Serialize;

use types::{Message, ToolDefinition};

/// One outbound LLM call, after the interceptor has rewritten the
/// advertised tool set.
#[derive(Debug, Clone, Serialize)]
pub struct TransportRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
}

/// A single model turn: the assistant message plus the stop reason
/// reported by the API ("tool_use", "end_turn", ...).
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub message: Message,
    pub stop_reason: String,
}

impl TransportResponse {
    /// True when the model emitted at least one tool_use block.
    pub fn has_tool_calls(&self) -> bool {
        match &self.message.content {
            types::MessageContent::Blocks(blocks) => blocks
                .iter()
                .any(|b| matches!(b, types::ContentBlock::ToolUse { .. })),
            types::MessageContent::Text(_) => false,
        }
    }
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send one request to the model and return its reply. No retries at
    /// this layer; failures propagate to the loop driver.
    async fn chat(&self, request: TransportRequest) -> anyhow::Result<TransportResponse>;
}

#[cfg(test)]
mod tests {
    use super::types::{ContentBlock, Message};
    use super::TransportResponse;

    #[test]
    fn tool_calls_are_detected_in_blocks() {
        let response = TransportResponse {
            message: Message::assistant_blocks(vec![ContentBlock::ToolUse {
                id: "t1".to_string(),
                name: "weather".to_string(),
                input: serde_json::json!({}),
            }]),
            stop_reason: "tool_use".to_string(),
        };
        assert!(response.has_tool_calls());

        let response = TransportResponse {
            message: Message::assistant("plain reply"),
            stop_reason: "end_turn".to_string(),
        };
        assert!(!response.has_tool_calls());
    }
}
