use serde::{Deserialize, Serialize};

use repochat_index::chunker::ChunkerConfig;
use repochat_index::embedder::EmbedderConfig;
use repochat_index::fetcher::FetcherConfig;
use repochat_index::github::DEFAULT_API_URL;
use repochat_index::retriever::{FilterMode, RetrievalConfig};
use repochat_index::store::{DEFAULT_COLLECTION, ReingestPolicy};

use crate::vault::Secret;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub chunker: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalSection,
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".into()
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_url: String,
    pub concurrency: usize,
    pub allowed_extensions: Vec<String>,
    pub excluded_dirs: Vec<String>,
    pub max_file_bytes: u64,
    pub max_depth: usize,
    pub max_tree_requests: usize,
    pub expand_truncated: bool,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        let fetcher = FetcherConfig::default();
        Self {
            api_url: DEFAULT_API_URL.into(),
            concurrency: fetcher.concurrency,
            allowed_extensions: fetcher.allowed_extensions,
            excluded_dirs: fetcher.excluded_dirs,
            max_file_bytes: fetcher.max_file_bytes,
            max_depth: fetcher.max_depth,
            max_tree_requests: fetcher.max_tree_requests,
            expand_truncated: fetcher.expand_truncated,
        }
    }
}

impl From<&GitHubConfig> for FetcherConfig {
    fn from(c: &GitHubConfig) -> Self {
        Self {
            concurrency: c.concurrency,
            allowed_extensions: c.allowed_extensions.clone(),
            excluded_dirs: c.excluded_dirs.clone(),
            max_file_bytes: c.max_file_bytes,
            max_depth: c.max_depth,
            max_tree_requests: c.max_tree_requests,
            expand_truncated: c.expand_truncated,
        }
    }
}

/// Chunk sizes in characters.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        let c = ChunkerConfig::default();
        Self {
            chunk_size: c.chunk_size,
            chunk_overlap: c.chunk_overlap,
        }
    }
}

impl From<&ChunkingConfig> for ChunkerConfig {
    fn from(c: &ChunkingConfig) -> Self {
        Self {
            chunk_size: c.chunk_size,
            chunk_overlap: c.chunk_overlap,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub batch_size: usize,
    pub max_batch_chars: usize,
    pub concurrency: usize,
    /// Retries on HTTP 429 before giving up.
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let e = EmbedderConfig::default();
        Self {
            base_url: default_openai_base_url(),
            model: "text-embedding-3-small".into(),
            batch_size: e.batch_size,
            max_batch_chars: e.max_batch_chars,
            concurrency: e.concurrency,
            max_retries: 3,
        }
    }
}

impl From<&EmbeddingConfig> for EmbedderConfig {
    fn from(c: &EmbeddingConfig) -> Self {
        Self {
            batch_size: c.batch_size,
            max_batch_chars: c.max_batch_chars,
            concurrency: c.concurrency,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ChatConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Retries on HTTP 429 before giving up.
    pub max_retries: u32,
    /// Overrides the built-in prompt. `{context}`, `{chat_history}` and
    /// `{question}` are substituted.
    pub prompt_template: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: "gpt-4o-mini".into(),
            max_tokens: 1024,
            temperature: 0.0,
            max_retries: 3,
            prompt_template: None,
        }
    }
}

/// Vector store backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Qdrant,
    /// Process-local store, lost on exit.
    Memory,
}

impl StoreBackend {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Qdrant => "qdrant",
            Self::Memory => "memory",
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qdrant" => Ok(Self::Qdrant),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown store backend: {other}")),
        }
    }
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub qdrant_url: String,
    pub collection: String,
    pub insert_batch_size: usize,
    pub reingest: ReingestPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Qdrant,
            qdrant_url: "http://localhost:6334".into(),
            collection: DEFAULT_COLLECTION.into(),
            insert_batch_size: 100,
            reingest: ReingestPolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrievalSection {
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub char_budget: usize,
    pub separator: String,
    pub filter: FilterMode,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        let r = RetrievalConfig::default();
        Self {
            top_k: r.top_k,
            similarity_threshold: r.similarity_threshold,
            char_budget: r.char_budget,
            separator: r.separator,
            filter: r.filter,
        }
    }
}

impl From<&RetrievalSection> for RetrievalConfig {
    fn from(c: &RetrievalSection) -> Self {
        Self {
            top_k: c.top_k,
            similarity_threshold: c.similarity_threshold,
            char_budget: c.char_budget,
            separator: c.separator.clone(),
            filter: c.filter,
        }
    }
}

/// Credentials resolved at startup. Never read from the config file.
#[derive(Debug, Default)]
pub struct ResolvedSecrets {
    pub github_token: Option<Secret>,
    pub openai_api_key: Option<Secret>,
    pub chat_api_key: Option<Secret>,
}
