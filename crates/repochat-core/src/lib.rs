//! Configuration, chat orchestration and application wiring.

pub mod app;
pub mod bootstrap;
pub mod chat;
pub mod config;
pub mod vault;

pub use app::{IngestError, Question, RepoChat};
pub use chat::{AnswerStream, ChatError, ChatOrchestrator};
pub use config::Config;
