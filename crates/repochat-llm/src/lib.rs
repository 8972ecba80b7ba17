//! Language-model and embedding provider abstraction.
//!
//! The pipeline talks to two collaborators through [`LlmProvider`]: one that
//! turns text batches into vectors and one that streams chat completions.

pub mod error;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod openai;
pub mod provider;
pub(crate) mod retry;
pub(crate) mod sse;

pub use error::LlmError;
pub use provider::{ChatStream, LlmProvider, Message, Role};
