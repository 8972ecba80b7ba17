//! Repository ingestion and retrieval.
//!
//! Ingest: a [`FileSource`] is walked by the [`fetcher`], files are split by the
//! [`chunker`], embedded in sub-batches by the [`embedder`] and persisted by the
//! [`store`]. Query: the [`retriever`] embeds a question, searches the store and
//! packs the best chunks into a bounded [`ContextWindow`].

pub mod chunker;
pub mod embedder;
pub mod error;
pub mod fetcher;
pub mod github;
pub mod indexer;
pub mod repo;
pub mod retriever;
pub mod source;
pub mod store;

pub use error::{FetchError, IndexError, Result};
pub use indexer::{IngestFailure, IngestReport, IngestionJob, JobStatus, RepoIndexer};
pub use repo::RepoId;
pub use retriever::{ContextWindow, RepoRetriever, RetrievalConfig};
pub use source::FileSource;
