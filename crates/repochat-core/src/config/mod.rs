mod env;
mod types;


pub use types::*;

use std::path::Path;

use anyhow::{Context, bail};

use crate::vault::{Secret, VaultProvider};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Resolve credentials through the vault.
    ///
    /// The chat key falls back to the embedding key when unset.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault backend fails.
    pub async fn resolve_secrets(&mut self, vault: &dyn VaultProvider) -> anyhow::Result<()> {
        if let Some(val) = vault.get_secret("GITHUB_TOKEN").await? {
            self.secrets.github_token = Some(Secret::new(val));
        }
        if let Some(val) = vault.get_secret("OPENAI_API_KEY").await? {
            self.secrets.openai_api_key = Some(Secret::new(val));
        }
        self.secrets.chat_api_key = match vault.get_secret("REPOCHAT_CHAT_API_KEY").await? {
            Some(val) => Some(Secret::new(val)),
            None => self.secrets.openai_api_key.clone(),
        };
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chunker.chunk_size == 0 {
            bail!("chunker.chunk_size must be positive");
        }
        if self.chunker.chunk_overlap >= self.chunker.chunk_size {
            bail!(
                "chunker.chunk_overlap ({}) must be smaller than chunker.chunk_size ({})",
                self.chunker.chunk_overlap,
                self.chunker.chunk_size
            );
        }
        for (name, value) in [
            ("github.concurrency", self.github.concurrency),
            ("github.max_tree_requests", self.github.max_tree_requests),
            ("embedding.batch_size", self.embedding.batch_size),
            ("embedding.max_batch_chars", self.embedding.max_batch_chars),
            ("embedding.concurrency", self.embedding.concurrency),
            ("store.insert_batch_size", self.store.insert_batch_size),
            ("retrieval.top_k", self.retrieval.top_k),
        ] {
            if value == 0 {
                bail!("{name} must be positive");
            }
        }
        if !(0.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            bail!(
                "retrieval.similarity_threshold must be within [0, 1], got {}",
                self.retrieval.similarity_threshold
            );
        }
        if self.store.collection.trim().is_empty() {
            bail!("store.collection must not be empty");
        }
        if let Some(template) = &self.chat.prompt_template
            && !template.contains("{question}")
        {
            bail!("chat.prompt_template must contain {{question}}");
        }
        Ok(())
    }
}
