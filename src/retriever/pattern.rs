//! Pattern back-end: the query is compiled as a regex and matched
//! against tool names. Matches score a flat 1.0.

use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::Mutex;
use tracing::warn;

use super::{SearchMetadata, SearchType, ToolReference, ToolRetriever, ToolSearchRequest,
    ToolSearchResponse};
use crate::error::Result;

pub struct PatternToolRetriever {
    /// session -> (tool name -> description)
    sessions: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl PatternToolRetriever {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for PatternToolRetriever {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolRetriever for PatternToolRetriever {
    fn search_type(&self) -> SearchType {
        SearchType::Regex
    }

    async fn index_tool(&self, session_id: &str, tool: ToolReference) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(session_id.to_string())
            .or_default()
            .insert(tool.tool_name, tool.summary);
        Ok(())
    }

    async fn find_tools(&self, request: &ToolSearchRequest) -> Result<ToolSearchResponse> {
        let query = request.query.trim();
        if query.is_empty() {
            return Ok(ToolSearchResponse::empty(self.search_type(), query));
        }

        let pattern = match Regex::new(query) {
            Ok(pattern) => pattern,
            Err(e) => {
                warn!(query, error = %e, "invalid tool name pattern");
                return Ok(ToolSearchResponse::empty_with_warning(
                    self.search_type(),
                    query,
                    format!("invalid pattern: {e}"),
                ));
            }
        };

        let sessions = self.sessions.lock().await;
        let Some(session) = sessions.get(&request.session_id) else {
            return Ok(ToolSearchResponse::empty(self.search_type(), query));
        };

        let mut references: Vec<ToolReference> = session
            .iter()
            .filter(|(name, _)| pattern.is_match(name))
            .map(|(name, summary)| ToolReference {
                tool_name: name.clone(),
                summary: summary.clone(),
                relevance_score: 1.0,
            })
            .collect();

        // Scores are all equal; order by name so results are stable.
        references.sort_by(|a, b| a.tool_name.cmp(&b.tool_name));

        let total_matches = references.len();
        references.truncate(request.effective_max_results());

        Ok(ToolSearchResponse {
            tool_references: references,
            total_matches,
            metadata: SearchMetadata {
                search_type: self.search_type(),
                query: query.to_string(),
                warning: None,
            },
        })
    }

    async fn clear_index(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(name: &str) -> ToolReference {
        ToolReference::unscored(name, format!("{name} description"))
    }

    #[tokio::test]
    async fn matches_names_against_regex() {
        let retriever = PatternToolRetriever::new();
        retriever.index_tool("s1", reference("getWeather")).await.unwrap();
        retriever.index_tool("s1", reference("getForecast")).await.unwrap();
        retriever.index_tool("s1", reference("saveProduct")).await.unwrap();

        let response = retriever
            .find_tools(&ToolSearchRequest::new("s1", "^get.*"))
            .await
            .unwrap();

        let names: Vec<&str> = response
            .tool_references
            .iter()
            .map(|r| r.tool_name.as_str())
            .collect();
        assert_eq!(names, vec!["getForecast", "getWeather"]);
        assert!(response
            .tool_references
            .iter()
            .all(|r| (r.relevance_score - 1.0).abs() < f32::EPSILON));
    }

    #[tokio::test]
    async fn invalid_pattern_is_soft_failure() {
        let retriever = PatternToolRetriever::new();
        retriever.index_tool("s1", reference("getWeather")).await.unwrap();

        let response = retriever
            .find_tools(&ToolSearchRequest::new("s1", "(unclosed"))
            .await
            .unwrap();

        assert!(response.tool_references.is_empty());
        assert!(response.metadata.warning.is_some());
    }

    #[tokio::test]
    async fn empty_query_matches_nothing() {
        let retriever = PatternToolRetriever::new();
        retriever.index_tool("s1", reference("getWeather")).await.unwrap();

        let response = retriever
            .find_tools(&ToolSearchRequest::new("s1", ""))
            .await
            .unwrap();
        assert!(response.tool_references.is_empty());
    }

    #[tokio::test]
    async fn clear_is_session_scoped() {
        let retriever = PatternToolRetriever::new();
        retriever.index_tool("a", reference("alpha")).await.unwrap();
        retriever.index_tool("b", reference("beta")).await.unwrap();

        retriever.clear_index("a").await.unwrap();

        let response = retriever
            .find_tools(&ToolSearchRequest::new("b", "beta"))
            .await
            .unwrap();
        assert_eq!(response.tool_references.len(), 1);
    }
}
