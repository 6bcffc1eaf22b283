//! Semantic back-end: cosine similarity over embedded tool descriptions.
//!
//! Embedding is injected; the store is a linear-scan in-memory map keyed
//! by `(session_id, tool_name)`. Linear scan is fine at tool-catalog
//! scale.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use super::{SearchMetadata, SearchType, ToolReference, ToolRetriever, ToolSearchRequest,
    ToolSearchResponse};
use crate::error::{Error, Result};

pub const DEFAULT_MIN_SCORE: f32 = 0.25;

const INDEX_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Produces a dense vector for a piece of text. The only I/O this
/// back-end performs goes through here.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// Which textual form of a tool gets embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingText {
    Description,
    NameAndDescription,
}

struct IndexedTool {
    summary: String,
    vector: Vec<f32>,
}

pub struct SemanticToolRetriever {
    embedder: Arc<dyn Embedder>,
    text_form: EmbeddingText,
    min_score: f32,
    sessions: Mutex<HashMap<String, HashMap<String, IndexedTool>>>,
}

impl SemanticToolRetriever {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            text_form: EmbeddingText::NameAndDescription,
            min_score: DEFAULT_MIN_SCORE,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_text_form(mut self, text_form: EmbeddingText) -> Self {
        self.text_form = text_form;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    fn embedding_text(&self, tool: &ToolReference) -> String {
        match self.text_form {
            EmbeddingText::Description => tool.summary.clone(),
            EmbeddingText::NameAndDescription => {
                format!("{} {}", tool.tool_name.replace('_', " "), tool.summary)
            }
        }
    }

    /// Embed with one retry after a short backoff; the embedding service
    /// is the only thing here that can be transiently down.
    async fn embed_with_retry(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        match self.embedder.embed(text).await {
            Ok(vector) => Ok(vector),
            Err(first) => {
                warn!(error = %first, "embedding failed, retrying once");
                tokio::time::sleep(INDEX_RETRY_BACKOFF).await;
                self.embedder.embed(text).await
            }
        }
    }
}

#[async_trait]
impl ToolRetriever for SemanticToolRetriever {
    fn search_type(&self) -> SearchType {
        SearchType::Semantic
    }

    async fn index_tool(&self, session_id: &str, tool: ToolReference) -> Result<()> {
        let text = self.embedding_text(&tool);
        let vector = self
            .embed_with_retry(&text)
            .await
            .map_err(|e| Error::BackendUnavailable(format!("embedding failed: {e:#}")))?;

        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(session_id.to_string())
            .or_default()
            .insert(
                tool.tool_name,
                IndexedTool {
                    summary: tool.summary,
                    vector,
                },
            );
        Ok(())
    }

    async fn find_tools(&self, request: &ToolSearchRequest) -> Result<ToolSearchResponse> {
        let query = request.query.trim();
        if query.is_empty() {
            return Ok(ToolSearchResponse::empty(self.search_type(), query));
        }

        let query_vector = match self.embedder.embed(query).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(error = %e, "query embedding failed");
                return Ok(ToolSearchResponse::empty_with_warning(
                    self.search_type(),
                    query,
                    format!("embedding failed: {e:#}"),
                ));
            }
        };

        let sessions = self.sessions.lock().await;
        let Some(session) = sessions.get(&request.session_id) else {
            return Ok(ToolSearchResponse::empty(self.search_type(), query));
        };

        let mut references: Vec<ToolReference> = session
            .iter()
            .map(|(name, indexed)| ToolReference {
                tool_name: name.clone(),
                summary: indexed.summary.clone(),
                relevance_score: cosine_similarity(&query_vector, &indexed.vector),
            })
            .filter(|r| r.relevance_score >= self.min_score)
            .collect();

        references.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

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

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
