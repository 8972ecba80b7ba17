//! Ingestion and query entrypoints.

use std::sync::Arc;

use repochat_index::chunker::ChunkerConfig;
use repochat_index::embedder::BatchEmbedder;
use repochat_index::fetcher::RepoFetcher;
use repochat_index::store::ChunkStore;
use repochat_index::{
    ContextWindow, FileSource, IndexError, IngestFailure, IngestReport, RepoId, RepoIndexer,
    RepoRetriever,
};
use repochat_llm::{LlmProvider, Message};
use repochat_memory::VectorStore;

use crate::chat::{AnswerStream, ChatOrchestrator};
use crate::config::Config;

/// One chat turn.
#[derive(Debug, Clone)]
pub struct Question {
    pub text: String,
    pub repo: RepoId,
    /// Prior turns, oldest first.
    pub history: Vec<Message>,
}

impl Question {
    #[must_use]
    pub fn new(text: impl Into<String>, repo: RepoId) -> Self {
        Self {
            text: text.into(),
            repo,
            history: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid repository identifier: {0}")]
    InvalidRepository(#[source] IndexError),
    #[error(transparent)]
    Failed(#[from] IngestFailure),
}

/// Wires the ingest and query paths around shared collaborators.
///
/// `S` lists and reads repository files, `E` embeds chunks and questions,
/// `C` generates answers.
pub struct RepoChat<S: FileSource, E: LlmProvider, C: LlmProvider> {
    chunks: ChunkStore,
    indexer: RepoIndexer<S, E>,
    retriever: RepoRetriever<E>,
    chat: ChatOrchestrator<C>,
}

impl<S: FileSource, E: LlmProvider, C: LlmProvider> RepoChat<S, E, C> {
    #[must_use]
    pub fn new(
        chunks: ChunkStore,
        indexer: RepoIndexer<S, E>,
        retriever: RepoRetriever<E>,
        chat: ChatOrchestrator<C>,
    ) -> Self {
        Self {
            chunks,
            indexer,
            retriever,
            chat,
        }
    }

    /// Build the pipeline from configuration and already constructed collaborators.
    #[must_use]
    pub fn from_parts(
        config: &Config,
        source: Arc<S>,
        embedder: Arc<E>,
        chat: Arc<C>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        let chunks = ChunkStore::new(store, config.store.collection.clone())
            .with_insert_batch_size(config.store.insert_batch_size)
            .with_policy(config.store.reingest);
        let indexer = RepoIndexer::new(
            RepoFetcher::new(source, (&config.github).into()),
            ChunkerConfig::from(&config.chunker),
            BatchEmbedder::new(Arc::clone(&embedder), (&config.embedding).into()),
            chunks.clone(),
        );
        let retriever = RepoRetriever::new(chunks.clone(), embedder, (&config.retrieval).into());
        let mut orchestrator = ChatOrchestrator::new(chat);
        if let Some(template) = &config.chat.prompt_template {
            orchestrator = orchestrator.with_template(template.clone());
        }
        Self::new(chunks, indexer, retriever, orchestrator)
    }

    /// Ingest the repository named by `identifier` (`owner/name` or a GitHub URL).
    ///
    /// # Errors
    ///
    /// Returns `IngestError::InvalidRepository` for a malformed identifier and
    /// `IngestError::Failed` when the ingestion job fails.
    pub async fn ingest(&self, identifier: &str) -> Result<IngestReport, IngestError> {
        let repo = RepoId::parse(identifier).map_err(IngestError::InvalidRepository)?;
        Ok(self.indexer.ingest(&repo).await?)
    }

    /// Remove every stored chunk of the repository named by `identifier`.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Validation` for a malformed identifier, or the
    /// store error if deletion fails.
    pub async fn reset(&self, identifier: &str) -> Result<RepoId, IndexError> {
        let repo = RepoId::parse(identifier)?;
        self.chunks.delete_repo(&repo.to_string()).await?;
        tracing::info!(%repo, "repository chunks removed");
        Ok(repo)
    }

    /// Drop the whole chunk collection, every repository included.
    ///
    /// # Errors
    ///
    /// Returns the store error if the collection cannot be dropped.
    pub async fn reset_all(&self) -> Result<(), IndexError> {
        self.chunks.drop_collection().await?;
        tracing::info!(collection = self.chunks.collection(), "chunk collection dropped");
        Ok(())
    }

    /// Context that would ground an answer to `question`.
    pub async fn context_for(&self, question: &Question) -> ContextWindow {
        self.retriever.retrieve(&question.text, &question.repo).await
    }

    /// Retrieve context and stream the answer.
    ///
    /// Retrieval problems degrade to an ungrounded answer; only model failures
    /// appear as an error item in the stream.
    pub async fn ask(&self, question: &Question) -> AnswerStream {
        let context = self.context_for(question).await;
        if context.is_empty() {
            tracing::info!(repo = %question.repo, "no context found, answering without grounding");
        }
        self.chat
            .answer(&question.history, &question.text, &context.text)
            .await
    }
}
