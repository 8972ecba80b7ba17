//! Question → bounded context window.

use std::sync::Arc;

use repochat_llm::LlmProvider;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::repo::RepoId;
use crate::store::{ChunkStore, StoredChunk, repo_filter};

/// How the repository predicate is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Filter inside the store when it supports payload filters, otherwise
    /// fall back to `Post`.
    #[default]
    Auto,
    /// Query the whole collection and discard foreign rows afterwards.
    ///
    /// The top-`K` cut happens before the discard, so fewer than `K` rows of
    /// the requested repository, or none, may remain even when matches exist.
    Post,
}

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Candidates requested from the store.
    pub top_k: usize,
    /// Minimum similarity in `[0, 1]`.
    pub similarity_threshold: f32,
    /// Maximum characters of the assembled context.
    pub char_budget: usize,
    pub separator: String,
    pub filter: FilterMode,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.5,
            char_budget: 12_000,
            separator: "\n\n".into(),
            filter: FilterMode::Auto,
        }
    }
}

/// Chunks selected for a question, most similar first, and their joined text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextWindow {
    pub chunks: Vec<StoredChunk>,
    pub text: String,
    pub char_budget: usize,
}

impl ContextWindow {
    #[must_use]
    pub fn empty(char_budget: usize) -> Self {
        Self {
            chunks: Vec::new(),
            text: String::new(),
            char_budget,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

pub struct RepoRetriever<P: LlmProvider> {
    store: ChunkStore,
    provider: Arc<P>,
    config: RetrievalConfig,
}

impl<P: LlmProvider> RepoRetriever<P> {
    #[must_use]
    pub fn new(store: ChunkStore, provider: Arc<P>, config: RetrievalConfig) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    /// Build the context for `question` from chunks of `repo`.
    ///
    /// Never fails: a missing collection or failing collaborator yields an
    /// empty window.
    pub async fn retrieve(&self, question: &str, repo: &RepoId) -> ContextWindow {
        match self.candidates(question, repo).await {
            Ok(chunks) => {
                let window =
                    assemble_context(chunks, self.config.char_budget, &self.config.separator);
                tracing::debug!(
                    %repo,
                    chunks = window.chunks.len(),
                    chars = window.text.chars().count(),
                    "context assembled"
                );
                window
            }
            Err(e) => {
                tracing::warn!(%repo, error = %e, "retrieval failed, continuing without context");
                ContextWindow::empty(self.config.char_budget)
            }
        }
    }

    async fn candidates(&self, question: &str, repo: &RepoId) -> Result<Vec<StoredChunk>> {
        let vector = self.provider.embed(question).await?;
        let repo_tag = repo.to_string();
        let threshold = Some(self.config.similarity_threshold.clamp(0.0, 1.0));

        let pre_filter =
            self.config.filter == FilterMode::Auto && self.store.supports_filter();
        let mut hits = if pre_filter {
            self.store
                .search(vector, self.config.top_k, threshold, Some(repo_filter(&repo_tag)))
                .await?
        } else {
            let mut hits = self
                .store
                .search(vector, self.config.top_k, threshold, None)
                .await?;
            let before = hits.len();
            hits.retain(|h| h.repo == repo_tag);
            let discarded = before - hits.len();
            if discarded > 0 {
                tracing::info!(
                    %repo,
                    discarded,
                    kept = hits.len(),
                    "post-filter discarded rows of other repositories"
                );
            }
            hits
        };

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(hits)
    }
}

/// Join chunk texts, most similar first, stopping at the first chunk that
/// would push the text past `char_budget` characters.
#[must_use]
pub fn assemble_context(
    mut chunks: Vec<StoredChunk>,
    char_budget: usize,
    separator: &str,
) -> ContextWindow {
    chunks.sort_by(|a, b| b.score.total_cmp(&a.score));
    let sep_len = separator.chars().count();

    let mut kept = Vec::new();
    let mut text = String::new();
    let mut used = 0usize;

    for chunk in chunks {
        let cost = chunk.content.chars().count() + if kept.is_empty() { 0 } else { sep_len };
        if used + cost > char_budget {
            break;
        }
        if !kept.is_empty() {
            text.push_str(separator);
        }
        text.push_str(&chunk.content);
        used += cost;
        kept.push(chunk);
    }

    ContextWindow {
        chunks: kept,
        text,
        char_budget,
    }
}
