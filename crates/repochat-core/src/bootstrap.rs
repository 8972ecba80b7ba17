//! Application bootstrap: config resolution, provider and store construction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use repochat_index::github::GitHubSource;
use repochat_llm::openai::OpenAiProvider;
use repochat_memory::{InMemoryVectorStore, QdrantOps, VectorStore};

use crate::app::RepoChat;
use crate::config::{Config, StoreBackend};
use crate::vault::{EnvVaultProvider, VaultProvider};

pub type DefaultRepoChat = RepoChat<GitHubSource, OpenAiProvider, OpenAiProvider>;

pub struct AppBuilder {
    config: Config,
    config_path: PathBuf,
}

impl AppBuilder {
    /// Load and validate config from `path`, then resolve credentials from
    /// the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be loaded or is invalid.
    pub async fn from_path(path: PathBuf) -> anyhow::Result<Self> {
        Self::with_vault(path, &EnvVaultProvider).await
    }

    /// # Errors
    ///
    /// Returns an error if the config cannot be loaded, is invalid, or the
    /// vault fails.
    pub async fn with_vault(path: PathBuf, vault: &dyn VaultProvider) -> anyhow::Result<Self> {
        let mut config = Config::load(&path)?;
        config.validate()?;
        config.resolve_secrets(vault).await?;
        Ok(Self {
            config,
            config_path: path,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// # Errors
    ///
    /// Returns an error if the Qdrant client cannot be created.
    pub fn build_vector_store(&self) -> anyhow::Result<Arc<dyn VectorStore>> {
        let store = &self.config.store;
        tracing::info!(backend = %store.backend, collection = %store.collection, "vector store");
        Ok(match store.backend {
            StoreBackend::Qdrant => Arc::new(
                QdrantOps::new(&store.qdrant_url)
                    .with_context(|| format!("failed to connect to Qdrant at {}", store.qdrant_url))?,
            ),
            StoreBackend::Memory => Arc::new(InMemoryVectorStore::new()),
        })
    }

    /// # Errors
    ///
    /// Returns an error if `OPENAI_API_KEY` is not set.
    pub fn build_embedding_provider(&self) -> anyhow::Result<OpenAiProvider> {
        let key = self
            .config
            .secrets
            .openai_api_key
            .as_ref()
            .context("OPENAI_API_KEY is required for embeddings")?;
        let e = &self.config.embedding;
        // Only the embeddings endpoint is used, so the chat model and token
        // limit are placeholders.
        Ok(OpenAiProvider::new(
            key.expose().to_owned(),
            e.base_url.clone(),
            e.model.clone(),
            0,
            Some(e.model.clone()),
        )
        .with_max_retries(e.max_retries))
    }

    /// # Errors
    ///
    /// Returns an error if neither `REPOCHAT_CHAT_API_KEY` nor
    /// `OPENAI_API_KEY` is set.
    pub fn build_chat_provider(&self) -> anyhow::Result<OpenAiProvider> {
        let key = self
            .config
            .secrets
            .chat_api_key
            .as_ref()
            .context("REPOCHAT_CHAT_API_KEY or OPENAI_API_KEY is required for chat")?;
        let c = &self.config.chat;
        Ok(OpenAiProvider::new(
            key.expose().to_owned(),
            c.base_url.clone(),
            c.model.clone(),
            c.max_tokens,
            None,
        )
        .with_temperature(c.temperature)
        .with_max_retries(c.max_retries))
    }

    #[must_use]
    pub fn build_source(&self) -> GitHubSource {
        let token = self
            .config
            .secrets
            .github_token
            .as_ref()
            .map(|t| t.expose().to_owned());
        if token.is_none() {
            tracing::info!("GITHUB_TOKEN not set, using unauthenticated GitHub API");
        }
        GitHubSource::new(self.config.github.api_url.clone(), token)
    }

    /// Construct every collaborator once and wire the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if a required credential is missing or the vector
    /// store cannot be created.
    pub fn build(&self) -> anyhow::Result<DefaultRepoChat> {
        let store = self.build_vector_store()?;
        let embedder = self.build_embedding_provider()?;
        let chat = self.build_chat_provider()?;
        Ok(RepoChat::from_parts(
            &self.config,
            Arc::new(self.build_source()),
            Arc::new(embedder),
            Arc::new(chat),
            store,
        ))
    }
}

/// Priority: explicit path > `REPOCHAT_CONFIG` env > `config/default.toml`.
#[must_use]
pub fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("REPOCHAT_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}
