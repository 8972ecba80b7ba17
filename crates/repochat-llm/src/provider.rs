use std::fmt;
use std::future::Future;
use std::pin::Pin;

use futures_core::Stream;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Text fragments of a streamed completion, in arrival order.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

pub trait LlmProvider: Send + Sync {
    /// Send messages to the model and return the full assistant reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to communicate or the response is invalid.
    fn chat(&self, messages: &[Message]) -> impl Future<Output = Result<String, LlmError>> + Send;

    /// Start a streaming completion. Fragments arrive in generation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be started. Failures after the
    /// first fragment are delivered as an `Err` item inside the stream.
    fn chat_stream(
        &self,
        messages: &[Message],
    ) -> impl Future<Output = Result<ChatStream, LlmError>> + Send;

    fn supports_streaming(&self) -> bool;

    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider does not support embeddings or the call fails.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send;

    /// Embed an ordered batch. `output[i]` is the embedding of `texts[i]`.
    ///
    /// The default implementation embeds texts one by one.
    ///
    /// # Errors
    ///
    /// Returns an error if any embedding in the batch fails.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, LlmError>> + Send {
        async move {
            let mut vectors = Vec::with_capacity(texts.len());
            for text in texts {
                vectors.push(self.embed(text).await?);
            }
            Ok(vectors)
        }
    }

    fn supports_embeddings(&self) -> bool;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        let role: Role = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, Role::User);
    }

    #[test]
    fn role_display_matches_wire_name() {
        assert_eq!(Role::System.to_string(), "system");
        assert_eq!(Role::User.to_string(), "user");
    }

    #[test]
    fn message_constructors() {
        let m = Message::user("hi");
        assert_eq!(m.role, Role::User);
        assert_eq!(m.content, "hi");
        assert_eq!(Message::assistant("ok").role, Role::Assistant);
    }

    struct CountingEmbedder;

    impl LlmProvider for CountingEmbedder {
        async fn chat(&self, _messages: &[Message]) -> Result<String, LlmError> {
            Ok(String::new())
        }

        async fn chat_stream(&self, _messages: &[Message]) -> Result<ChatStream, LlmError> {
            Err(LlmError::Other("unsupported".into()))
        }

        fn supports_streaming(&self) -> bool {
            false
        }

        #[allow(clippy::cast_precision_loss)]
        async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
            Ok(vec![text.len() as f32])
        }

        fn supports_embeddings(&self) -> bool {
            true
        }

        #[allow(clippy::unnecessary_literal_bound)]
        fn name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn default_embed_batch_preserves_order() {
        let texts = vec!["a".to_owned(), "bbb".to_owned(), "cc".to_owned()];
        let vectors = CountingEmbedder.embed_batch(&texts).await.unwrap();
        assert_eq!(vectors, vec![vec![1.0], vec![3.0], vec![2.0]]);
    }
}
