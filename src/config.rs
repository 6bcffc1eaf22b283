//! Interceptor configuration and builder.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::retriever::ToolRetriever;

/// Anchor for middleware ordering; smaller runs earlier.
pub const HIGHEST_PRECEDENCE: i32 = i32::MIN;

/// Default position: early enough to rewrite the advertised tool set
/// before any middleware that executes tool calls.
pub const DEFAULT_ORDER: i32 = HIGHEST_PRECEDENCE + 300;

pub const DEFAULT_TOOL_SEARCH_TOOL_NAME: &str = "toolSearchTool";
pub const DEFAULT_MAX_RESULTS: usize = 5;
pub const DEFAULT_MAX_TURNS: usize = 10;

pub const DEFAULT_SYSTEM_MESSAGE_SUFFIX: &str = "\n\n\
You do not see every available tool up front. When a task needs a \
capability you currently have no tool for, call the toolSearchTool tool \
first. Pass a natural-language `query` describing the capability, an \
optional `maxResults` limit (1-10, default 5), and an optional \
`categoryFilter`. It returns only the names of matching tools; each \
returned tool becomes directly callable on your next turn.";

pub struct InterceptorConfig {
    /// Retriever the search tool queries.
    pub tool_searcher: Arc<dyn ToolRetriever>,
    /// Relative ordering against other middleware in the host chain.
    pub order: i32,
    /// Appended to the system message when a loop starts.
    pub system_message_suffix: String,
    /// Accumulating vs. non-accumulating discovered set.
    pub reference_tool_name_accumulation: bool,
    /// Default result cap advertised on the search tool.
    pub max_results: usize,
    /// Maximum LLM turns per top-level request.
    pub max_turns: usize,
    /// Reserved name of the synthetic search tool.
    pub tool_search_tool_name: String,
}

impl InterceptorConfig {
    pub fn builder() -> InterceptorConfigBuilder {
        InterceptorConfigBuilder::default()
    }
}

pub struct InterceptorConfigBuilder {
    tool_searcher: Option<Arc<dyn ToolRetriever>>,
    order: i32,
    system_message_suffix: String,
    reference_tool_name_accumulation: bool,
    max_results: usize,
    max_turns: usize,
    tool_search_tool_name: String,
}

impl Default for InterceptorConfigBuilder {
    fn default() -> Self {
        Self {
            tool_searcher: None,
            order: DEFAULT_ORDER,
            system_message_suffix: DEFAULT_SYSTEM_MESSAGE_SUFFIX.to_string(),
            reference_tool_name_accumulation: true,
            max_results: DEFAULT_MAX_RESULTS,
            max_turns: DEFAULT_MAX_TURNS,
            tool_search_tool_name: DEFAULT_TOOL_SEARCH_TOOL_NAME.to_string(),
        }
    }
}

impl InterceptorConfigBuilder {
    pub fn tool_searcher(mut self, tool_searcher: Arc<dyn ToolRetriever>) -> Self {
        self.tool_searcher = Some(tool_searcher);
        self
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn system_message_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.system_message_suffix = suffix.into();
        self
    }

    pub fn reference_tool_name_accumulation(mut self, accumulate: bool) -> Self {
        self.reference_tool_name_accumulation = accumulate;
        self
    }

    pub fn max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn tool_search_tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_search_tool_name = name.into();
        self
    }

    pub fn build(self) -> Result<InterceptorConfig> {
        let tool_searcher = self.tool_searcher.ok_or_else(|| {
            Error::ConfigurationConflict("a tool searcher is required".to_string())
        })?;
        if self.tool_search_tool_name.trim().is_empty() {
            return Err(Error::ConfigurationConflict(
                "the search tool name must not be empty".to_string(),
            ));
        }
        if self.max_turns == 0 {
            return Err(Error::ConfigurationConflict(
                "max_turns must be at least 1".to_string(),
            ));
        }

        Ok(InterceptorConfig {
            tool_searcher,
            order: self.order,
            system_message_suffix: self.system_message_suffix,
            reference_tool_name_accumulation: self.reference_tool_name_accumulation,
            max_results: self.max_results.clamp(1, 10),
            max_turns: self.max_turns,
            tool_search_tool_name: self.tool_search_tool_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retriever::keyword::KeywordToolRetriever;

    #[test]
    fn build_without_searcher_fails() {
        let result = InterceptorConfig::builder().build();
        assert!(matches!(result, Err(Error::ConfigurationConflict(_))));
    }

    #[test]
    fn defaults_are_applied() {
        let config = InterceptorConfig::builder()
            .tool_searcher(Arc::new(KeywordToolRetriever::new()))
            .build()
            .unwrap();

        assert_eq!(config.order, DEFAULT_ORDER);
        assert_eq!(config.max_results, 5);
        assert_eq!(config.max_turns, 10);
        assert!(config.reference_tool_name_accumulation);
        assert_eq!(config.tool_search_tool_name, "toolSearchTool");
    }

    #[test]
    fn max_results_clamps_to_valid_range() {
        let config = InterceptorConfig::builder()
            .tool_searcher(Arc::new(KeywordToolRetriever::new()))
            .max_results(50)
            .build()
            .unwrap();
        assert_eq!(config.max_results, 10);

        let config = InterceptorConfig::builder()
            .tool_searcher(Arc::new(KeywordToolRetriever::new()))
            .max_results(0)
            .build()
            .unwrap();
        assert_eq!(config.max_results, 1);
    }
}
