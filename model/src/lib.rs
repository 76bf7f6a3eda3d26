pub mod config;
pub mod gemini;
pub mod provider;
pub mod types;

pub use config::GeminiConfig;
pub use gemini::GeminiProvider;
pub use provider::{ModelError, ModelProvider, ModelResult};
pub use types::{
    ChatMessage, ChatRequest, ChatResponse, Choice, FinishReason, MessageRole, ModelInfo, Usage,
};

pub mod prelude {
    pub use crate::config::*;
    pub use crate::gemini::*;
    pub use crate::provider::*;
    pub use crate::types::*;
}
