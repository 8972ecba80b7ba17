//! Vector persistence for repository chunks.
//!
//! [`VectorStore`] is the seam between the indexing pipeline and a concrete
//! engine. [`QdrantOps`] talks to a Qdrant server, [`InMemoryVectorStore`]
//! keeps everything in process for tests and throwaway sessions.

pub mod in_memory_store;
pub mod qdrant_ops;
pub mod vector_store;

pub use in_memory_store::InMemoryVectorStore;
pub use qdrant_ops::QdrantOps;
pub use vector_store::{
    BoxFuture, FieldCondition, FieldValue, ScoredVectorPoint, VectorFilter, VectorPoint,
    VectorStore, VectorStoreError,
};
