//! Error types for repochat-index.

use std::num::TryFromIntError;

use repochat_memory::VectorStoreError;

/// Failures of the repository file source.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("repository {repo} not found or not accessible")]
    NotFound { repo: String },

    #[error("file source rejected credentials (status {status})")]
    Unauthorized { status: u16 },

    #[error("file source rate limit exhausted")]
    RateLimited,

    #[error("file source request failed (status {status}): {url}")]
    Status { status: u16, url: String },

    #[error("invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("blob decode failed: {0}")]
    Decode(String),
}

/// Errors that can occur while ingesting or querying a repository.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Malformed repository identifier or invalid configuration.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Branch or tree lookup failed.
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Embedding provider failed after the split retry.
    #[error("embedding failed: {0}")]
    Embedding(#[from] repochat_llm::LlmError),

    /// Embedding provider returned vectors of the wrong count or dimension.
    #[error("embedding shape mismatch: {0}")]
    EmbeddingShape(String),

    /// A storage batch failed; `committed` rows were written before it.
    #[error("storage failed after {committed} rows were committed: {source}")]
    Storage {
        committed: usize,
        #[source]
        source: VectorStoreError,
    },

    /// Vector store error outside of batched inserts.
    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    /// Integer conversion error.
    #[error("integer conversion failed: {0}")]
    IntConversion(#[from] TryFromIntError),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
