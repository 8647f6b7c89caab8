//! One support-agent turn for an inbound ticket message

use std::sync::Arc;

use super::prompt::{build_instructions, history_input};
use super::summarizer::ResultSummarizer;
use crate::connections::{Identity, ServerFrame, SharedConnectionRegistry};
use crate::dispatch::CommandDispatcher;
use crate::llm::{LanguageModel, ResponseRequest, Role};
use crate::tickets::TicketStore;
use crate::tools::{ToolCallInterpreter, ToolOutcome, tool_definitions};
use crate::{Error, Result};

/// Shown to the user when the model cannot be reached
pub const GENERIC_FAILURE_REPLY: &str =
    "Sorry, I'm having trouble responding right now. Please try again in a moment.";

/// Used when the model answered with neither text nor tool calls
pub const EMPTY_REPLY_FALLBACK: &str =
    "I'm not sure how to help with that yet. Could you share a few more details?";

/// Per-turn model settings
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model: String,
    /// Conversation turns sent to the model, newest kept
    pub history_limit: usize,
    pub organization_name: String,
    pub max_output_tokens: Option<u32>,
}

/// Final answer for one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReply {
    pub text: String,
    /// Tool calls executed during the turn
    pub tool_outcomes: Vec<ToolOutcome>,
}

/// Drives a ticket turn: history, model call, tools, summary, persistence
pub struct Orchestrator {
    store: Arc<dyn TicketStore>,
    model: Arc<dyn LanguageModel>,
    dispatcher: Arc<CommandDispatcher>,
    registry: SharedConnectionRegistry,
    interpreter: ToolCallInterpreter,
    summarizer: ResultSummarizer,
    settings: AgentSettings,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        store: Arc<dyn TicketStore>,
        model: Arc<dyn LanguageModel>,
        dispatcher: Arc<CommandDispatcher>,
        registry: SharedConnectionRegistry,
        settings: AgentSettings,
    ) -> Self {
        let interpreter = ToolCallInterpreter::new(Arc::clone(&store), Arc::clone(&dispatcher));
        let summarizer = ResultSummarizer::new(Arc::clone(&model), settings.model.clone())
            .with_max_output_tokens(settings.max_output_tokens);

        Self {
            store,
            model,
            dispatcher,
            registry,
            interpreter,
            summarizer,
            settings,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Answer a user message on a ticket
    ///
    /// The inbound message is persisted before the model is called, so it
    /// survives a failed turn.
    ///
    /// # Errors
    ///
    /// - `Error::NotFound` for an unknown ticket
    /// - `Error::Llm` if the primary model call fails; callers show
    ///   [`GENERIC_FAILURE_REPLY`]
    /// - storage errors
    pub async fn handle_message(&self, ticket_id: &str, content: &str) -> Result<AgentReply> {
        let ticket = self.store.ticket(ticket_id)?;
        self.store.append_message(&ticket.id, Role::User, content)?;

        let turns = self
            .store
            .recent_messages(&ticket.id, self.settings.history_limit)?;
        let history = history_input(&turns);
        let instructions = build_instructions(
            &self.settings.organization_name,
            &ticket,
            self.dispatcher.allowlist(),
        );

        let request = ResponseRequest {
            model: self.settings.model.clone(),
            instructions: instructions.clone(),
            input: history.clone(),
            tools: tool_definitions(self.dispatcher.allowlist()),
            max_output_tokens: self.settings.max_output_tokens,
        };

        let response = match self.model.respond(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(ticket_id = %ticket.id, error = %e, "model call failed");
                return Err(Error::Llm(e));
            }
        };

        let interpretation = self.interpreter.interpret(&ticket, &response.output).await;

        let text = if interpretation.tools_ran() {
            tracing::debug!(
                ticket_id = %ticket.id,
                tools = interpretation.outcomes.len(),
                "summarizing tool results"
            );
            self.summarizer
                .summarize(&instructions, &history, &interpretation.outcomes)
                .await
        } else {
            let reply = interpretation.reply_text.trim();
            if reply.is_empty() {
                tracing::warn!(ticket_id = %ticket.id, "model returned an empty reply");
                EMPTY_REPLY_FALLBACK.to_string()
            } else {
                reply.to_string()
            }
        };

        self.store.append_message(&ticket.id, Role::Assistant, &text)?;
        self.notify_requester(&ticket.requester_id, &ticket.id, &text)
            .await;

        tracing::info!(
            ticket_id = %ticket.id,
            tools = interpretation.outcomes.len(),
            "ticket turn complete"
        );

        Ok(AgentReply {
            text,
            tool_outcomes: interpretation.outcomes,
        })
    }

    /// Push the reply to the requester's browser session, if open
    async fn notify_requester(&self, requester_id: &str, ticket_id: &str, text: &str) {
        let identity = Identity::requester(requester_id);
        if let Some(connection) = self.registry.get(&identity).await {
            let delivered = connection.push(ServerFrame::TicketReply {
                ticket_id: ticket_id.to_string(),
                content: text.to_string(),
            });
            tracing::debug!(identity = %identity, delivered, "pushed ticket reply");
        }
    }
}
