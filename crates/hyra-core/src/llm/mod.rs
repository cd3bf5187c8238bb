//! LLM integration - OpenAI-compatible APIs
//!
//! - Chat completions client used by the classifier and judges
//! - Request/response types for chat and plain completions

mod client;
mod types;

pub(crate) use client::handle_error_response;
pub use client::{LlmClient, LlmClientBuilder, TextGenerator};
pub use types::{
    ChatChoice, ChatRequest, ChatResponse, ChoiceMessage, CompletionChoice, CompletionLogprobs,
    CompletionRequest, CompletionResponse, Message, MessageRole, Usage,
};
