use super::{Config, StoreBackend};

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_ingest();
        self.apply_env_overrides_query();
    }

    fn apply_env_overrides_ingest(&mut self) {
        if let Ok(v) = std::env::var("REPOCHAT_GITHUB_API_URL") {
            self.github.api_url = v;
        }
        if let Ok(v) = std::env::var("REPOCHAT_GITHUB_CONCURRENCY")
            && let Ok(n) = v.parse::<usize>()
        {
            self.github.concurrency = n;
        }
        if let Ok(v) = std::env::var("REPOCHAT_GITHUB_EXTENSIONS") {
            self.github.allowed_extensions = v
                .split(',')
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(v) = std::env::var("REPOCHAT_CHUNK_SIZE")
            && let Ok(n) = v.parse::<usize>()
        {
            self.chunker.chunk_size = n;
        }
        if let Ok(v) = std::env::var("REPOCHAT_CHUNK_OVERLAP")
            && let Ok(n) = v.parse::<usize>()
        {
            self.chunker.chunk_overlap = n;
        }
        if let Ok(v) = std::env::var("REPOCHAT_EMBEDDING_BASE_URL") {
            self.embedding.base_url = v;
        }
        if let Ok(v) = std::env::var("REPOCHAT_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Ok(v) = std::env::var("REPOCHAT_EMBEDDING_BATCH_SIZE")
            && let Ok(n) = v.parse::<usize>()
        {
            self.embedding.batch_size = n;
        }
        if let Ok(v) = std::env::var("REPOCHAT_STORE_BACKEND") {
            if let Ok(backend) = v.parse::<StoreBackend>() {
                self.store.backend = backend;
            } else {
                tracing::warn!("ignoring invalid REPOCHAT_STORE_BACKEND value: {v}");
            }
        }
        if let Ok(v) = std::env::var("REPOCHAT_QDRANT_URL") {
            self.store.qdrant_url = v;
        }
        if let Ok(v) = std::env::var("REPOCHAT_COLLECTION") {
            self.store.collection = v;
        }
    }

    fn apply_env_overrides_query(&mut self) {
        if let Ok(v) = std::env::var("REPOCHAT_CHAT_BASE_URL") {
            self.chat.base_url = v;
        }
        if let Ok(v) = std::env::var("REPOCHAT_CHAT_MODEL") {
            self.chat.model = v;
        }
        if let Ok(v) = std::env::var("REPOCHAT_CHAT_MAX_TOKENS")
            && let Ok(n) = v.parse::<u32>()
        {
            self.chat.max_tokens = n;
        }
        if let Ok(v) = std::env::var("REPOCHAT_CHAT_TEMPERATURE")
            && let Ok(t) = v.parse::<f32>()
        {
            self.chat.temperature = t;
        }
        if let Ok(v) = std::env::var("REPOCHAT_RETRIEVAL_TOP_K") {
            if let Ok(k) = v.parse::<usize>() {
                self.retrieval.top_k = k;
            } else {
                tracing::warn!("ignoring invalid REPOCHAT_RETRIEVAL_TOP_K value: {v}");
            }
        }
        if let Ok(v) = std::env::var("REPOCHAT_RETRIEVAL_THRESHOLD") {
            if let Ok(t) = v.parse::<f32>() {
                self.retrieval.similarity_threshold = t.clamp(0.0, 1.0);
            } else {
                tracing::warn!("ignoring invalid REPOCHAT_RETRIEVAL_THRESHOLD value: {v}");
            }
        }
        if let Ok(v) = std::env::var("REPOCHAT_RETRIEVAL_CHAR_BUDGET")
            && let Ok(n) = v.parse::<usize>()
        {
            self.retrieval.char_budget = n;
        }
    }
}
