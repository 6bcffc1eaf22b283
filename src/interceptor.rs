//! The interceptor: rewrites each outbound request to hide inactive
//! tools, injects the search tool, reads discoveries back out of the
//! turn's tool-response messages, and drives the multi-turn loop until
//! the model stops calling tools.
//!
//! Discovered names travel exclusively through message history: the
//! model's search results land in tool_result blocks, and the next
//! turn's rewrite parses them back out. No side channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::config::InterceptorConfig;
use crate::error::{Error, Result};
use crate::llm::types::{ContentBlock, Message, MessageContent, ToolDefinition};
use crate::llm::{ChatTransport, TransportRequest, TransportResponse};
use crate::retriever::ToolReference;
use crate::session::{new_registry, SessionRegistry, SessionState};
use crate::tools::search_tool::{search_tool_definition, SearchToolCallback};
use crate::tools::{ToolCallback, ToolExecutionResult};

/// Context key carrying the caller's conversation id.
pub const CONVERSATION_ID: &str = "conversationId";

/// Response metadata key set when the loop stopped on its turn budget.
pub const LOOP_BUDGET_EXCEEDED_KEY: &str = "loopBudgetExceeded";

/// One top-level chat request as configured by the application: message
/// history, optional system prompt, and the full set of tool callbacks
/// the conversation may eventually use.
pub struct ChatRequest {
    pub context: HashMap<String, String>,
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<Arc<dyn ToolCallback>>,
    /// Cooperative cancellation; checked between suspension points.
    pub abort: Arc<AtomicBool>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            context: HashMap::new(),
            system: None,
            messages,
            tools: Vec::new(),
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.context.insert(CONVERSATION_ID.to_string(), id.into());
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn ToolCallback>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_abort(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = abort;
        self
    }
}

/// The final assistant reply for a top-level request.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub message: Message,
    pub stop_reason: String,
    /// Number of LLM turns the loop consumed.
    pub turns: usize,
    pub metadata: HashMap<String, String>,
}

impl ChatResponse {
    pub fn loop_budget_exceeded(&self) -> bool {
        self.metadata
            .get(LOOP_BUDGET_EXCEEDED_KEY)
            .is_some_and(|v| v == "true")
    }
}

pub struct ToolSearchInterceptor {
    config: InterceptorConfig,
    transport: Arc<dyn ChatTransport>,
    sessions: SessionRegistry,
}

impl ToolSearchInterceptor {
    pub fn new(config: InterceptorConfig, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            config,
            transport,
            sessions: new_registry(),
        }
    }

    pub fn name(&self) -> &'static str {
        "ToolSearchInterceptor"
    }

    /// Relative position in the host's middleware chain. Must sort
    /// before anything that executes tool calls.
    pub fn order(&self) -> i32 {
        self.config.order
    }

    /// Run one top-level request to completion: initialize the session,
    /// alternate model turns with tool execution, and tear the session
    /// down whatever the outcome.
    pub async fn advise(&self, request: ChatRequest) -> Result<ChatResponse> {
        let session_id = request
            .context
            .get(CONVERSATION_ID)
            .cloned()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        self.initialize_loop(&session_id, &request).await?;
        let result = self.drive_loop(&session_id, request).await;
        self.finalize_loop(&session_id).await;
        result
    }

    /// Once per top-level request: reserve the search tool name, index
    /// every configured tool, and cache the callbacks for the loop.
    async fn initialize_loop(&self, session_id: &str, request: &ChatRequest) -> Result<()> {
        let reserved = &self.config.tool_search_tool_name;
        for callback in &request.tools {
            if callback.definition().name == *reserved {
                return Err(Error::ConfigurationConflict(format!(
                    "tool name '{reserved}' is reserved for the search tool"
                )));
            }
        }

        // The index is ephemeral to one loop; start clean even if a
        // previous loop on this conversation was cut short.
        self.config.tool_searcher.clear_index(session_id).await?;

        let mut callbacks: HashMap<String, Arc<dyn ToolCallback>> = HashMap::new();
        for callback in &request.tools {
            let definition = callback.definition();
            let reference = ToolReference::unscored(&definition.name, &definition.description);
            if let Err(e) = self
                .config
                .tool_searcher
                .index_tool(session_id, reference)
                .await
            {
                warn!(tool = %definition.name, error = %e, "skipping unindexable tool");
            }
            callbacks.insert(definition.name.clone(), callback.clone());
        }

        let mut sessions = self.sessions.lock().await;
        sessions.insert(session_id.to_string(), SessionState::new(callbacks));
        Ok(())
    }

    /// Once per LLM turn: fold the latest search results into the
    /// discovered set and compute the advertised tool list.
    async fn before_call(&self, session_id: &str, messages: &[Message]) -> Vec<ToolDefinition> {
        let newly_named = latest_search_results(messages, &self.config.tool_search_tool_name);

        let mut tools = vec![self.search_definition()];
        let mut sessions = self.sessions.lock().await;
        if let Some(state) = sessions.get_mut(session_id) {
            if let Some(names) = newly_named {
                state.promote(names, self.config.reference_tool_name_accumulation);
            }
            tools.extend(
                state
                    .discovered_callbacks()
                    .iter()
                    .map(|callback| callback.definition().clone()),
            );
        }
        tools
    }

    /// Once per top-level request, however the loop ended: drop the
    /// session's index entries, cached callbacks, and discovered set.
    async fn finalize_loop(&self, session_id: &str) {
        if let Err(e) = self.config.tool_searcher.clear_index(session_id).await {
            warn!(session = %session_id, error = %e, "failed to clear tool index");
        }
        let mut sessions = self.sessions.lock().await;
        sessions.remove(session_id);
    }

    async fn drive_loop(&self, session_id: &str, request: ChatRequest) -> Result<ChatResponse> {
        let ChatRequest {
            system,
            mut messages,
            abort,
            ..
        } = request;
        let system = self.augment_system(system.as_deref());
        let search_callback = Arc::new(SearchToolCallback::new(
            &self.config.tool_search_tool_name,
            self.config.tool_searcher.clone(),
            session_id,
            self.config.max_results,
        ));

        let mut last: Option<TransportResponse> = None;
        for turn in 1..=self.config.max_turns {
            if abort.load(Ordering::Relaxed) {
                return Err(Error::Cancelled("request aborted".to_string()));
            }

            let tools = self.before_call(session_id, &messages).await;
            let response = self
                .transport
                .chat(TransportRequest {
                    system: Some(system.clone()),
                    messages: messages.clone(),
                    tools,
                })
                .await
                .map_err(Error::Transport)?;

            messages.push(response.message.clone());

            if response.stop_reason != "tool_use" || !response.has_tool_calls() {
                return Ok(ChatResponse {
                    message: response.message,
                    stop_reason: response.stop_reason,
                    turns: turn,
                    metadata: HashMap::new(),
                });
            }

            if abort.load(Ordering::Relaxed) {
                return Err(Error::Cancelled("request aborted".to_string()));
            }

            let tool_uses = extract_tool_uses(&response.message);

            let results = self
                .execute_tool_calls(session_id, &search_callback, &tool_uses, &abort)
                .await;
            messages.push(Message::tool_results(results));
            last = Some(response);
        }

        warn!(session = %session_id, turns = self.config.max_turns, "turn budget exhausted");
        let Some(response) = last else {
            return Err(Error::LoopBudgetExceeded(self.config.max_turns));
        };
        let mut metadata = HashMap::new();
        metadata.insert(LOOP_BUDGET_EXCEEDED_KEY.to_string(), "true".to_string());
        Ok(ChatResponse {
            message: response.message,
            stop_reason: response.stop_reason,
            turns: self.config.max_turns,
            metadata,
        })
    }

    async fn execute_tool_calls(
        &self,
        session_id: &str,
        search_callback: &Arc<SearchToolCallback>,
        tool_uses: &[(String, String, serde_json::Value)],
        abort: &Arc<AtomicBool>,
    ) -> Vec<ContentBlock> {
        let mut blocks: Vec<ContentBlock> = Vec::new();

        for (tool_id, tool_name, tool_input) in tool_uses {
            if abort.load(Ordering::Relaxed) {
                break;
            }

            let result = if *tool_name == self.config.tool_search_tool_name {
                match search_callback.call(tool_input).await {
                    Ok(content) => ToolExecutionResult {
                        content,
                        is_error: false,
                    },
                    Err(e) => ToolExecutionResult {
                        content: format!("{e:#}"),
                        is_error: true,
                    },
                }
            } else {
                let callback = {
                    let sessions = self.sessions.lock().await;
                    sessions
                        .get(session_id)
                        .and_then(|state| state.callbacks.get(tool_name).cloned())
                };
                match callback {
                    Some(callback) => match callback.call(tool_input).await {
                        Ok(content) => ToolExecutionResult {
                            content,
                            is_error: false,
                        },
                        Err(e) => ToolExecutionResult {
                            content: format!("{e:#}"),
                            is_error: true,
                        },
                    },
                    None => ToolExecutionResult {
                        content: format!("Unknown tool: {tool_name}"),
                        is_error: true,
                    },
                }
            };

            blocks.push(ContentBlock::ToolResult {
                tool_use_id: tool_id.clone(),
                content: result.content,
                is_error: Some(result.is_error),
            });
        }

        blocks
    }

    fn search_definition(&self) -> ToolDefinition {
        search_tool_definition(&self.config.tool_search_tool_name, self.config.max_results)
    }

    fn augment_system(&self, system: Option<&str>) -> String {
        match system {
            Some(text) => format!("{text}{}", self.config.system_message_suffix),
            None => self
                .config
                .system_message_suffix
                .trim_start()
                .to_string(),
        }
    }
}

/// Extract (id, name, input) tuples from tool_use blocks in an assistant
/// message.
fn extract_tool_uses(message: &Message) -> Vec<(String, String, serde_json::Value)> {
    match &message.content {
        MessageContent::Blocks(blocks) => blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.clone(), name.clone(), input.clone()))
                }
                _ => None,
            })
            .collect(),
        MessageContent::Text(_) => Vec::new(),
    }
}

/// Pull the most recent batch of search-tool results out of the message
/// history.
///
/// Returns `None` when no turn has produced a parseable search result
/// yet (including the case where the only candidates are malformed), so
/// the caller leaves the discovered set untouched.
fn latest_search_results(messages: &[Message], search_tool_name: &str) -> Option<Vec<String>> {
    // tool_use id -> tool name, gathered from assistant turns
    let mut names_by_id: HashMap<&str, &str> = HashMap::new();
    for message in messages {
        if message.role != "assistant" {
            continue;
        }
        if let MessageContent::Blocks(blocks) = &message.content {
            for block in blocks {
                if let ContentBlock::ToolUse { id, name, .. } = block {
                    names_by_id.insert(id.as_str(), name.as_str());
                }
            }
        }
    }

    for message in messages.iter().rev() {
        if message.role != "user" {
            continue;
        }
        let MessageContent::Blocks(blocks) = &message.content else {
            continue;
        };

        let search_results: Vec<&str> = blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } if names_by_id.get(tool_use_id.as_str()) == Some(&search_tool_name) => {
                    Some(content.as_str())
                }
                _ => None,
            })
            .collect();
        if search_results.is_empty() {
            continue;
        }

        let mut parsed_any = false;
        let mut names: Vec<String> = Vec::new();
        for content in search_results {
            match serde_json::from_str::<Vec<String>>(content) {
                Ok(batch) => {
                    parsed_any = true;
                    names.extend(batch);
                }
                Err(e) => {
                    warn!(error = %e, "ignoring malformed search tool response");
                }
            }
        }
        return parsed_any.then_some(names);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search_call(id: &str, query: &str) -> Message {
        Message::assistant_blocks(vec![ContentBlock::ToolUse {
            id: id.to_string(),
            name: "toolSearchTool".to_string(),
            input: serde_json::json!({"query": query}),
        }])
    }

    fn tool_result(id: &str, content: &str) -> Message {
        Message::tool_results(vec![ContentBlock::ToolResult {
            tool_use_id: id.to_string(),
            content: content.to_string(),
            is_error: None,
        }])
    }

    #[test]
    fn extracts_latest_search_results() {
        let messages = vec![
            Message::user("hi"),
            search_call("t1", "time"),
            tool_result("t1", r#"["currentTime"]"#),
            search_call("t2", "weather"),
            tool_result("t2", r#"["weather"]"#),
        ];

        let names = latest_search_results(&messages, "toolSearchTool").unwrap();
        assert_eq!(names, vec!["weather"]);
    }

    #[test]
    fn ignores_results_from_other_tools() {
        let messages = vec![
            Message::user("hi"),
            search_call("t1", "time"),
            tool_result("t1", r#"["currentTime"]"#),
            Message::assistant_blocks(vec![ContentBlock::ToolUse {
                id: "t2".to_string(),
                name: "currentTime".to_string(),
                input: serde_json::json!({}),
            }]),
            tool_result("t2", "14:02"),
        ];

        // The latest tool response is from currentTime, not the search
        // tool; the last *search* results still win.
        let names = latest_search_results(&messages, "toolSearchTool").unwrap();
        assert_eq!(names, vec!["currentTime"]);
    }

    #[test]
    fn malformed_results_leave_state_untouched() {
        let messages = vec![
            Message::user("hi"),
            search_call("t1", "time"),
            tool_result("t1", "not-a-json-array"),
        ];

        assert!(latest_search_results(&messages, "toolSearchTool").is_none());
    }

    #[test]
    fn mixed_valid_and_malformed_keeps_the_valid_batch() {
        let messages = vec![
            Message::user("hi"),
            Message::assistant_blocks(vec![
                ContentBlock::ToolUse {
                    id: "t1".to_string(),
                    name: "toolSearchTool".to_string(),
                    input: serde_json::json!({"query": "a"}),
                },
                ContentBlock::ToolUse {
                    id: "t2".to_string(),
                    name: "toolSearchTool".to_string(),
                    input: serde_json::json!({"query": "b"}),
                },
            ]),
            Message::tool_results(vec![
                ContentBlock::ToolResult {
                    tool_use_id: "t1".to_string(),
                    content: "garbage".to_string(),
                    is_error: None,
                },
                ContentBlock::ToolResult {
                    tool_use_id: "t2".to_string(),
                    content: r#"["weather"]"#.to_string(),
                    is_error: None,
                },
            ]),
        ];

        let names = latest_search_results(&messages, "toolSearchTool").unwrap();
        assert_eq!(names, vec!["weather"]);
    }

    #[test]
    fn no_search_results_yields_none() {
        let messages = vec![Message::user("hi"), Message::assistant("hello")];
        assert!(latest_search_results(&messages, "toolSearchTool").is_none());
    }

    #[test]
    fn extract_tool_uses_skips_text_blocks() {
        let message = Message::assistant_blocks(vec![
            ContentBlock::Text {
                text: "thinking out loud".to_string(),
            },
            ContentBlock::ToolUse {
                id: "t1".to_string(),
                name: "weather".to_string(),
                input: serde_json::json!({"location": "Landsmeer"}),
            },
        ]);

        let uses = extract_tool_uses(&message);
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].1, "weather");
    }
}
