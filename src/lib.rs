pub mod assistant;
pub mod causal;
pub mod classifier;
pub mod config;
pub mod data;
pub mod error;
pub mod execution;
pub mod llm;
pub mod narration;
pub mod prompts;
pub mod synthesis;
pub mod time;

pub use assistant::{BusinessAssistant, QueryResponse};
pub use error::{AssistantError, Result};
