pub mod backend;
pub mod client;
pub mod prompt;

pub use backend::{OfflineProvider, ProviderError, ReasoningProvider};
pub use client::LlmClient;
pub use prompt::LlmPrompt;
