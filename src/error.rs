pub type Result<T> = std::result::Result<T, Error>;

/// Externally visible failures. Every variant carries a human-readable
/// message; callers never see stack traces.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A reserved tool name collides, or a required component is missing
    /// at build time. Fatal; surfaced to the caller as-is.
    #[error("configuration conflict: {0}")]
    ConfigurationConflict(String),

    /// A retriever back-end cannot index or search (I/O or embedding
    /// failure).
    #[error("search backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A tool-response message claimed by the search tool is not a JSON
    /// string array. Soft-handled inside the loop; only surfaced when a
    /// caller parses search output directly.
    #[error("malformed search response: {0}")]
    MalformedSearchResponse(String),

    /// The model named a tool with no registered callback.
    #[error("unknown tool referenced: {0}")]
    UnknownToolReferenced(String),

    /// The per-request turn budget was reached.
    #[error("loop budget of {0} turns exceeded")]
    LoopBudgetExceeded(usize),

    /// The caller cancelled or timed out.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Transport-layer failure from the LLM client. Never recovered here.
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}
