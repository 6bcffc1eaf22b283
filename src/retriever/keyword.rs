//! Keyword back-end: BM25 scoring over tool descriptions.
//!
//! Each session owns a small document set; the search engine for a
//! session is rebuilt lazily before the first search after a write, so
//! indexing stays cheap and repeated searches reuse the engine.

use std::collections::HashMap;

use bm25::{Document, Language, SearchEngine, SearchEngineBuilder};
use tokio::sync::Mutex;

use super::{SearchMetadata, SearchType, ToolReference, ToolRetriever, ToolSearchRequest,
    ToolSearchResponse};
use crate::error::Result;

/// References scoring below this are omitted from results.
pub const DEFAULT_MIN_SCORE: f32 = 0.25;

struct SessionIndex {
    /// tool name -> description; duplicate names replace the prior entry
    docs: HashMap<String, String>,
    /// None after a write; rebuilt on the next search
    engine: Option<SearchEngine<String>>,
}

impl SessionIndex {
    fn new() -> Self {
        Self {
            docs: HashMap::new(),
            engine: None,
        }
    }

    fn refresh(&mut self) -> &SearchEngine<String> {
        let docs = &self.docs;
        self.engine.get_or_insert_with(|| {
            let documents: Vec<Document<String>> = docs
                .iter()
                .map(|(name, description)| Document {
                    id: name.clone(),
                    contents: format!("{} {}", name.replace('_', " "), description),
                })
                .collect();
            SearchEngineBuilder::with_documents(Language::English, documents).build()
        })
    }

    /// Run a query against the (lazily rebuilt) engine, returning
    /// `(tool_name, score)` pairs in descending score order.
    fn engine_search(&mut self, query: &str, limit: usize) -> Vec<(String, f32)> {
        if self.docs.is_empty() {
            return Vec::new();
        }
        self.refresh()
            .search(query, limit)
            .into_iter()
            .map(|result| (result.document.id, result.score))
            .collect()
    }
}

pub struct KeywordToolRetriever {
    min_score: f32,
    sessions: Mutex<HashMap<String, SessionIndex>>,
}

impl KeywordToolRetriever {
    pub fn new() -> Self {
        Self::with_min_score(DEFAULT_MIN_SCORE)
    }

    pub fn with_min_score(min_score: f32) -> Self {
        Self {
            min_score,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Number of tools indexed for the session.
    pub async fn len(&self, session_id: &str) -> usize {
        let sessions = self.sessions.lock().await;
        sessions.get(session_id).map_or(0, |s| s.docs.len())
    }

    pub async fn is_empty(&self, session_id: &str) -> bool {
        self.len(session_id).await == 0
    }

    /// Drop a single tool from the session's index.
    pub async fn remove_tool(&self, session_id: &str, tool_name: &str) {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(session_id) {
            if session.docs.remove(tool_name).is_some() {
                session.engine = None;
            }
        }
    }
}

impl Default for KeywordToolRetriever {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ToolRetriever for KeywordToolRetriever {
    fn search_type(&self) -> SearchType {
        SearchType::Keyword
    }

    async fn index_tool(&self, session_id: &str, tool: ToolReference) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(SessionIndex::new);
        session.docs.insert(tool.tool_name, tool.summary);
        session.engine = None;
        Ok(())
    }

    async fn find_tools(&self, request: &ToolSearchRequest) -> Result<ToolSearchResponse> {
        let query = request.query.trim();
        if query.is_empty() {
            return Ok(ToolSearchResponse::empty(self.search_type(), query));
        }

        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(&request.session_id) else {
            return Ok(ToolSearchResponse::empty(self.search_type(), query));
        };

        let doc_count = session.docs.len();
        let scored = session.engine_search(query, doc_count);
        let mut references: Vec<ToolReference> = scored
            .into_iter()
            .filter(|(_, score)| *score >= self.min_score)
            .map(|(name, score)| {
                let summary = session.docs.get(&name).cloned().unwrap_or_default();
                ToolReference {
                    tool_name: name,
                    summary,
                    relevance_score: score,
                }
            })
            .collect();

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
