//! Language model access
//!
//! The orchestrator and summarizer talk to the model through the
//! [`LanguageModel`] trait; [`ResponsesClient`] is the HTTP implementation

pub mod client;
pub mod types;

pub use client::{DEFAULT_BASE_URL, LanguageModel, LlmError, ResponsesClient};
pub use types::{
    InputItem, ModelResponse, OutputContent, OutputItem, ResponseRequest, Role, ToolDefinition,
};
