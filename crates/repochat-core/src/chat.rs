//! Prompt rendering and the streamed answer.

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt, future, stream};
use repochat_llm::{LlmError, LlmProvider, Message};

pub const DEFAULT_PROMPT_TEMPLATE: &str = "You are an expert software engineer explaining a GitHub repository.
Answer the user's question based only on the following context. If the answer is not in the context, say you don't know.

Context:
{context}

Current conversation:
{chat_history}

User: {question}
Answer:";

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("language model failed: {0}")]
    Llm(#[from] LlmError),
}

/// Answer fragments in arrival order. At most one `Err`, always last.
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

pub struct ChatOrchestrator<P: LlmProvider> {
    provider: Arc<P>,
    template: String,
}

impl<P: LlmProvider> ChatOrchestrator<P> {
    #[must_use]
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            template: DEFAULT_PROMPT_TEMPLATE.into(),
        }
    }

    /// Replace the prompt template. `{context}`, `{chat_history}` and
    /// `{question}` are substituted.
    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    #[must_use]
    pub fn render_prompt(&self, history: &[Message], question: &str, context: &str) -> String {
        render(&self.template, context, &format_history(history), question)
    }

    /// Stream an answer to `question`, grounded on `context`.
    ///
    /// Invocation failures become the stream's only item. A failure mid-stream
    /// ends the stream after the fragments already delivered.
    pub async fn answer(&self, history: &[Message], question: &str, context: &str) -> AnswerStream {
        let messages = vec![Message::user(self.render_prompt(history, question, context))];

        if !self.provider.supports_streaming() {
            let reply = self.provider.chat(&messages).await;
            if let Err(e) = &reply {
                tracing::warn!(provider = self.provider.name(), error = %e, "chat request failed");
            }
            return Box::pin(stream::once(future::ready(reply.map_err(ChatError::from))));
        }

        match self.provider.chat_stream(&messages).await {
            Ok(fragments) => Box::pin(fragments.scan(false, |failed, item| {
                if *failed {
                    return future::ready(None);
                }
                if let Err(e) = &item {
                    tracing::warn!(error = %e, "answer stream failed");
                    *failed = true;
                }
                future::ready(Some(item.map_err(ChatError::from)))
            })),
            Err(e) => {
                tracing::warn!(provider = self.provider.name(), error = %e, "chat stream failed to start");
                Box::pin(stream::once(future::ready(Err(ChatError::from(e)))))
            }
        }
    }
}

/// Prior turns as `role: content` lines.
#[must_use]
pub fn format_history(history: &[Message]) -> String {
    history
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

// Single pass so substituted text containing a placeholder is left alone.
fn render(template: &str, context: &str, chat_history: &str, question: &str) -> String {
    let mut out = String::with_capacity(template.len() + context.len() + chat_history.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let (value, len) = if tail.starts_with("{context}") {
            (context, "{context}".len())
        } else if tail.starts_with("{chat_history}") {
            (chat_history, "{chat_history}".len())
        } else if tail.starts_with("{question}") {
            (question, "{question}".len())
        } else {
            ("{", 1)
        };
        out.push_str(value);
        rest = &tail[len..];
    }
    out.push_str(rest);
    out
}
