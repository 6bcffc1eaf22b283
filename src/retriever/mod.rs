//! Session-scoped, scored search over tool descriptions.
//!
//! Three back-ends implement the same contract: keyword (BM25 over
//! descriptions), semantic (cosine similarity over embeddings), and
//! pattern (regex over tool names). The interceptor depends only on the
//! `ToolRetriever` trait.

pub mod keyword;
pub mod pattern;
pub mod semantic;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default cap on returned references when the request does not set one.
pub const DEFAULT_MAX_RESULTS: usize = 5;
/// Hard ceiling on returned references.
pub const MAX_MAX_RESULTS: usize = 10;

/// Advisory tag describing how a back-end matches queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchType {
    Keyword,
    Semantic,
    Regex,
}

/// Lightweight search result; also the unit handed to `index_tool`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolReference {
    pub tool_name: String,
    pub summary: String,
    pub relevance_score: f32,
}

impl ToolReference {
    /// A reference as indexed, before any query has scored it.
    pub fn unscored(tool_name: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            summary: summary.into(),
            relevance_score: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolSearchRequest {
    pub session_id: String,
    pub query: String,
    /// Zero and negative values clamp to 1; values above 10 clamp to 10.
    pub max_results: Option<i64>,
    pub category_filter: Option<String>,
}

impl ToolSearchRequest {
    pub fn new(session_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            query: query.into(),
            max_results: None,
            category_filter: None,
        }
    }

    /// The effective result cap after defaulting and clamping.
    pub fn effective_max_results(&self) -> usize {
        match self.max_results {
            None => DEFAULT_MAX_RESULTS,
            Some(n) if n < 1 => 1,
            Some(n) => (n as usize).min(MAX_MAX_RESULTS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchMetadata {
    pub search_type: SearchType,
    pub query: String,
    /// Set when a back-end failure was soft-handled into an empty result.
    pub warning: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ToolSearchResponse {
    /// Sorted non-increasing by `relevance_score`, truncated to the
    /// effective max results.
    pub tool_references: Vec<ToolReference>,
    /// Number of references at or above the back-end's minimum score,
    /// before truncation.
    pub total_matches: usize,
    pub metadata: SearchMetadata,
}

impl ToolSearchResponse {
    pub fn empty(search_type: SearchType, query: impl Into<String>) -> Self {
        Self {
            tool_references: Vec::new(),
            total_matches: 0,
            metadata: SearchMetadata {
                search_type,
                query: query.into(),
                warning: None,
            },
        }
    }

    pub fn empty_with_warning(
        search_type: SearchType,
        query: impl Into<String>,
        warning: impl Into<String>,
    ) -> Self {
        let mut response = Self::empty(search_type, query);
        response.metadata.warning = Some(warning.into());
        response
    }
}

/// Per-session index of `(tool_name, description)` pairs with scored
/// lookup.
///
/// Implementations are shared across sessions and must isolate entries by
/// `session_id`: `find_tools` never returns a reference indexed for a
/// different session, and `clear_index` removes only the given session's
/// entries.
#[async_trait]
pub trait ToolRetriever: Send + Sync {
    fn search_type(&self) -> SearchType;

    /// Add a reference to the session's index. A duplicate tool name
    /// replaces the prior entry. Fails only on back-end I/O errors,
    /// never on domain errors.
    async fn index_tool(&self, session_id: &str, tool: ToolReference) -> Result<()>;

    async fn find_tools(&self, request: &ToolSearchRequest) -> Result<ToolSearchResponse>;

    /// Remove all entries for the session. Idempotent.
    async fn clear_index(&self, session_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_results_defaults_and_clamps() {
        let mut request = ToolSearchRequest::new("s", "q");
        assert_eq!(request.effective_max_results(), 5);

        request.max_results = Some(0);
        assert_eq!(request.effective_max_results(), 1);

        request.max_results = Some(-3);
        assert_eq!(request.effective_max_results(), 1);

        request.max_results = Some(7);
        assert_eq!(request.effective_max_results(), 7);

        request.max_results = Some(25);
        assert_eq!(request.effective_max_results(), 10);
    }
}
