//! Chunk rows in a [`VectorStore`] collection.
//!
//! Row payload: `repo`, `file_path`, `content`, `sequence_index`; the vector is
//! the chunk embedding.

use std::collections::HashMap;
use std::sync::Arc;

use repochat_memory::{ScoredVectorPoint, VectorFilter, VectorPoint, VectorStore};
use serde::{Deserialize, Serialize};

use crate::chunker::FileChunk;
use crate::error::{IndexError, Result};

pub const DEFAULT_COLLECTION: &str = "repochat_chunks";

/// What happens to rows of a repository that is ingested again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReingestPolicy {
    /// Rows are keyed by (repo, file path, sequence index); re-ingesting
    /// overwrites them in place.
    #[default]
    Upsert,
    /// Every ingestion adds fresh rows.
    Append,
}

/// A persisted chunk with its embedding.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: String,
    pub chunk: FileChunk,
    pub embedding: Vec<f32>,
}

/// A search result with decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub repo: String,
    pub file_path: String,
    pub content: String,
    pub sequence_index: usize,
    pub score: f32,
}

#[derive(Clone)]
pub struct ChunkStore {
    store: Arc<dyn VectorStore>,
    collection: String,
    insert_batch_size: usize,
    policy: ReingestPolicy,
}

impl std::fmt::Debug for ChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStore")
            .field("collection", &self.collection)
            .field("insert_batch_size", &self.insert_batch_size)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ChunkStore {
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            insert_batch_size: 100,
            policy: ReingestPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_insert_batch_size(mut self, size: usize) -> Self {
        self.insert_batch_size = size.max(1);
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ReingestPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub fn supports_filter(&self) -> bool {
        self.store.supports_filter()
    }

    /// # Errors
    ///
    /// Returns an error if the collection cannot be created.
    pub async fn ensure_collection(&self, vector_size: u64) -> Result<()> {
        self.store
            .ensure_collection(&self.collection, vector_size)
            .await?;
        Ok(())
    }

    /// Build a record, assigning its id according to the re-ingest policy.
    #[must_use]
    pub fn record(&self, chunk: FileChunk, embedding: Vec<f32>) -> ChunkRecord {
        let id = match self.policy {
            ReingestPolicy::Upsert => {
                stable_chunk_id(&chunk.repo, &chunk.file_path, chunk.sequence_index)
            }
            ReingestPolicy::Append => uuid::Uuid::new_v4().to_string(),
        };
        ChunkRecord {
            id,
            chunk,
            embedding,
        }
    }

    /// Write rows in fixed-size batches. Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Storage` carrying the number of rows committed by
    /// earlier batches when a batch fails.
    pub async fn insert(&self, records: Vec<ChunkRecord>) -> Result<usize> {
        let total = records.len();
        let mut committed = 0usize;
        let mut records = records.into_iter().peekable();

        while records.peek().is_some() {
            let points: Vec<VectorPoint> = records
                .by_ref()
                .take(self.insert_batch_size)
                .map(record_to_point)
                .collect();
            let batch_len = points.len();

            if let Err(source) = self.store.upsert(&self.collection, points).await {
                tracing::error!(
                    committed,
                    total,
                    batch_len,
                    error = %source,
                    "storage batch failed"
                );
                return Err(IndexError::Storage { committed, source });
            }
            committed += batch_len;
            tracing::debug!(committed, total, "stored batch");
        }

        Ok(committed)
    }

    /// Nearest chunks to `vector`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub async fn search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        score_threshold: Option<f32>,
        filter: Option<VectorFilter>,
    ) -> Result<Vec<StoredChunk>> {
        let hits = self
            .store
            .search(
                &self.collection,
                vector,
                u64::try_from(limit)?,
                score_threshold,
                filter,
            )
            .await?;
        Ok(hits.into_iter().filter_map(point_to_chunk).collect())
    }

    /// Number of rows tagged with `repo`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub async fn count_repo(&self, repo: &str) -> Result<u64> {
        Ok(self
            .store
            .count(&self.collection, Some(repo_filter(repo)))
            .await?)
    }

    /// Remove every row tagged with `repo`.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    pub async fn delete_repo(&self, repo: &str) -> Result<()> {
        if !self.store.collection_exists(&self.collection).await? {
            return Ok(());
        }
        self.store
            .delete_by_filter(&self.collection, repo_filter(repo))
            .await?;
        Ok(())
    }

    /// Drop the collection with every repository's rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the deletion.
    pub async fn drop_collection(&self) -> Result<()> {
        if self.store.collection_exists(&self.collection).await? {
            self.store.delete_collection(&self.collection).await?;
        }
        Ok(())
    }
}

#[must_use]
pub fn repo_filter(repo: &str) -> VectorFilter {
    VectorFilter::text_eq("repo", repo)
}

/// Deterministic point id for (repo, file path, sequence index).
#[must_use]
pub fn stable_chunk_id(repo: &str, file_path: &str, sequence_index: usize) -> String {
    let key = format!("{repo}\n{file_path}\n{sequence_index}");
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, key.as_bytes()).to_string()
}

fn record_to_point(record: ChunkRecord) -> VectorPoint {
    let ChunkRecord {
        id,
        chunk,
        embedding,
    } = record;
    VectorPoint {
        id,
        vector: embedding,
        payload: HashMap::from([
            ("repo".to_owned(), serde_json::Value::String(chunk.repo)),
            (
                "file_path".to_owned(),
                serde_json::Value::String(chunk.file_path),
            ),
            ("content".to_owned(), serde_json::Value::String(chunk.text)),
            (
                "sequence_index".to_owned(),
                serde_json::Value::from(chunk.sequence_index),
            ),
        ]),
    }
}

fn point_to_chunk(point: ScoredVectorPoint) -> Option<StoredChunk> {
    let text = |key: &str| point.payload.get(key)?.as_str().map(str::to_owned);
    Some(StoredChunk {
        repo: text("repo")?,
        file_path: text("file_path")?,
        content: text("content")?,
        sequence_index: point
            .payload
            .get("sequence_index")
            .and_then(serde_json::Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or_default(),
        score: point.score,
    })
}
