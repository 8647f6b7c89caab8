//! Second model pass that explains tool results to the user

use std::sync::Arc;

use crate::llm::{InputItem, LanguageModel, ResponseRequest};
use crate::tools::{ToolOutcome, join_outputs};

/// Re-invokes the model with the executed tool calls and their results
pub struct ResultSummarizer {
    model: Arc<dyn LanguageModel>,
    model_name: String,
    max_output_tokens: Option<u32>,
}

impl std::fmt::Debug for ResultSummarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSummarizer")
            .field("model_name", &self.model_name)
            .finish_non_exhaustive()
    }
}

impl ResultSummarizer {
    #[must_use]
    pub fn new(model: Arc<dyn LanguageModel>, model_name: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            max_output_tokens: None,
        }
    }

    #[must_use]
    pub const fn with_max_output_tokens(mut self, max: Option<u32>) -> Self {
        self.max_output_tokens = max;
        self
    }

    /// Build the follow-up request: history, then one call/output pair per outcome
    #[must_use]
    pub fn build_request(
        &self,
        instructions: &str,
        history: &[InputItem],
        outcomes: &[ToolOutcome],
    ) -> ResponseRequest {
        let mut input = history.to_vec();
        for outcome in outcomes {
            input.push(InputItem::FunctionCall {
                call_id: outcome.call_id.clone(),
                name: outcome.name.clone(),
                arguments: outcome.arguments.clone(),
            });
            input.push(InputItem::FunctionCallOutput {
                call_id: outcome.call_id.clone(),
                output: outcome.output.clone(),
            });
        }

        ResponseRequest {
            model: self.model_name.clone(),
            instructions: instructions.to_string(),
            input,
            tools: Vec::new(),
            max_output_tokens: self.max_output_tokens,
        }
    }

    /// Explain tool outcomes to the user
    ///
    /// Never fails: a model error or empty answer degrades to the raw tool
    /// outputs joined by a blank line.
    pub async fn summarize(
        &self,
        instructions: &str,
        history: &[InputItem],
        outcomes: &[ToolOutcome],
    ) -> String {
        let request = self.build_request(instructions, history, outcomes);

        match self.model.respond(&request).await {
            Ok(response) => {
                let text = response.output_text();
                let text = text.trim();
                if text.is_empty() {
                    tracing::warn!(tools = outcomes.len(), "summarizer returned no text, using raw tool output");
                    join_outputs(outcomes)
                } else {
                    text.to_string()
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, tools = outcomes.len(), "summarization failed, using raw tool output");
                join_outputs(outcomes)
            }
        }
    }
}
