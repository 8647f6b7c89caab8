//! Request/response types for the Responses API

use serde::{Deserialize, Serialize};

/// Speaker of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One item of model input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputItem {
    /// Plain conversation message
    Message { role: Role, content: String },
    /// A function call the assistant made earlier in the conversation
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    /// The result fed back for a function call
    FunctionCallOutput { call_id: String, output: String },
}

impl InputItem {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::Message {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Message {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Function tool exposed to the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: &'static str,
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: serde_json::Value,
    pub strict: bool,
}

impl ToolDefinition {
    #[must_use]
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: "function",
            name: name.into(),
            description: description.into(),
            parameters,
            strict: true,
        }
    }
}

/// Body of a `POST /responses` call
#[derive(Debug, Clone, Serialize)]
pub struct ResponseRequest {
    pub model: String,
    pub instructions: String,
    pub input: Vec<InputItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

/// Content part of an output message
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputContent {
    OutputText {
        text: String,
    },
    #[serde(other)]
    Other,
}

/// One item of model output
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    /// Assistant text
    Message {
        #[serde(default)]
        content: Vec<OutputContent>,
    },
    /// Structured tool invocation; `arguments` is a JSON-encoded object
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    /// Reasoning and any other item kinds are ignored
    #[serde(other)]
    Other,
}

impl OutputItem {
    /// Assistant message with a single text part
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Message {
            content: vec![OutputContent::OutputText { text: text.into() }],
        }
    }

    #[must_use]
    pub fn function_call(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self::FunctionCall {
            call_id: call_id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Parsed `/responses` reply
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ModelResponse {
    #[serde(default)]
    pub output: Vec<OutputItem>,
}

impl ModelResponse {
    #[must_use]
    pub const fn new(output: Vec<OutputItem>) -> Self {
        Self { output }
    }

    /// Concatenated text of every assistant message
    #[must_use]
    pub fn output_text(&self) -> String {
        self.output
            .iter()
            .filter_map(|item| match item {
                OutputItem::Message { content } => Some(content),
                _ => None,
            })
            .flatten()
            .filter_map(|part| match part {
                OutputContent::OutputText { text } => Some(text.as_str()),
                OutputContent::Other => None,
            })
            .collect()
    }
}
