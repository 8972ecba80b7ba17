//! Test-only mock LLM provider.

use std::sync::{Arc, Mutex};

use crate::provider::{ChatStream, LlmProvider, Message};

#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    recorded: Arc<Mutex<Vec<Vec<Message>>>>,
    embed_calls: Arc<Mutex<Vec<usize>>>,
    embed_delays_ms: Arc<Mutex<Vec<u64>>>,
    embed_completed: Arc<Mutex<Vec<usize>>>,
    pub default_response: String,
    pub embedding: Vec<f32>,
    /// When set, embeddings are derived from the text instead of `embedding`.
    pub hashed_dimensions: Option<usize>,
    pub supports_embeddings: bool,
    pub streaming: bool,
    pub fail_chat: bool,
    pub fail_embed: bool,
    /// Emit this many fragments, then a stream error.
    pub fail_stream_after: Option<usize>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            recorded: Arc::new(Mutex::new(Vec::new())),
            embed_calls: Arc::new(Mutex::new(Vec::new())),
            embed_delays_ms: Arc::new(Mutex::new(Vec::new())),
            embed_completed: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock response".into(),
            embedding: vec![0.0; 384],
            hashed_dimensions: None,
            supports_embeddings: false,
            streaming: false,
            fail_chat: false,
            fail_embed: false,
            fail_stream_after: None,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_chat: true,
            ..Self::default()
        }
    }

    /// Embeddings become a hashed bag of words, so texts sharing terms score higher.
    #[must_use]
    pub fn with_hashed_embeddings(mut self, dimensions: usize) -> Self {
        self.supports_embeddings = true;
        self.hashed_dimensions = Some(dimensions);
        self
    }

    #[must_use]
    pub fn with_fixed_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.supports_embeddings = true;
        self.embedding = embedding;
        self
    }

    #[must_use]
    pub fn with_streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    #[must_use]
    pub fn with_stream_failure_after(mut self, fragments: usize) -> Self {
        self.streaming = true;
        self.fail_stream_after = Some(fragments);
        self
    }

    /// Sleep `delays_ms[n]` milliseconds inside the n-th `embed_batch` call.
    /// Calls past the end of the list do not sleep.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_embed_delays(self, delays_ms: Vec<u64>) -> Self {
        *self.embed_delays_ms.lock().unwrap() = delays_ms;
        self
    }

    /// Message lists passed to `chat`/`chat_stream`, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn recorded_messages(&self) -> Vec<Vec<Message>> {
        self.recorded.lock().unwrap().clone()
    }

    /// Batch sizes passed to `embed_batch`, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn embed_batch_sizes(&self) -> Vec<usize> {
        self.embed_calls.lock().unwrap().clone()
    }

    /// Indices of `embed_batch` calls in the order they returned.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn embed_completion_order(&self) -> Vec<usize> {
        self.embed_completed.lock().unwrap().clone()
    }

    fn next_response(&self, messages: &[Message]) -> String {
        self.recorded.lock().unwrap().push(messages.to_vec());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            self.default_response.clone()
        } else {
            responses.remove(0)
        }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        match self.hashed_dimensions {
            Some(dim) => hashed_embedding(text, dim),
            None => self.embedding.clone(),
        }
    }
}

/// Deterministic bag-of-words embedding: FNV-1a of each lowercase token, L2-normalized.
#[must_use]
pub fn hashed_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dimensions.max(1)];
    let lowered = text.to_lowercase();
    for token in lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in token.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        #[allow(clippy::cast_possible_truncation)]
        let slot = (hash % vector.len() as u64) as usize;
        vector[slot] += 1.0;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

/// Split text into fragments that concatenate back to the original.
fn word_fragments(text: &str) -> Vec<String> {
    text.split_inclusive(' ').map(str::to_owned).collect()
}

impl LlmProvider for MockProvider {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat(&self, messages: &[Message]) -> Result<String, crate::LlmError> {
        if self.fail_chat {
            return Err(crate::LlmError::Other("mock LLM error".into()));
        }
        Ok(self.next_response(messages))
    }

    async fn chat_stream(&self, messages: &[Message]) -> Result<ChatStream, crate::LlmError> {
        let response = self.chat(messages).await?;
        let mut chunks: Vec<Result<String, crate::LlmError>> =
            word_fragments(&response).into_iter().map(Ok).collect();
        if let Some(after) = self.fail_stream_after {
            chunks.truncate(after);
            chunks.push(Err(crate::LlmError::SseParse("mock stream error".into())));
            chunks.push(Ok("after error".into()));
        }
        Ok(Box::pin(tokio_stream::iter(chunks)))
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, crate::LlmError> {
        if !self.supports_embeddings {
            return Err(crate::LlmError::EmbedUnsupported {
                provider: "mock".into(),
            });
        }
        if self.fail_embed {
            return Err(crate::LlmError::Other("mock embedding error".into()));
        }
        Ok(self.vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, crate::LlmError> {
        let (call, delay) = {
            let mut calls = self.embed_calls.lock().unwrap();
            calls.push(texts.len());
            let call = calls.len() - 1;
            (call, self.embed_delays_ms.lock().unwrap().get(call).copied())
        };
        if let Some(ms) = delay.filter(|ms| *ms > 0) {
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        }
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        self.embed_completed.lock().unwrap().push(call);
        Ok(vectors)
    }

    fn supports_embeddings(&self) -> bool {
        self.supports_embeddings
    }
}
