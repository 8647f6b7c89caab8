//! Turns one model response into a reply plus executed tool outcomes

use std::sync::Arc;

use super::schema::{ToolArgumentError, ToolInvocation};
use crate::connections::Identity;
use crate::dispatch::{CommandDispatcher, DispatchError};
use crate::llm::{OutputContent, OutputItem};
use crate::tickets::{Ticket, TicketStore};

/// Result of executing one function call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub call_id: String,
    pub name: String,
    /// Raw JSON arguments as the model sent them
    pub arguments: String,
    /// Text fed back to the model
    pub output: String,
    pub is_error: bool,
}

/// Everything one model turn produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interpretation {
    /// Concatenated assistant text
    pub reply_text: String,
    /// Executed function calls, in the order the model made them
    pub outcomes: Vec<ToolOutcome>,
}

impl Interpretation {
    #[must_use]
    pub fn tools_ran(&self) -> bool {
        !self.outcomes.is_empty()
    }

    /// Raw tool outputs joined by a blank line
    #[must_use]
    pub fn raw_outputs(&self) -> String {
        join_outputs(&self.outcomes)
    }
}

/// Tool outputs joined by a blank line
#[must_use]
pub fn join_outputs(outcomes: &[ToolOutcome]) -> String {
    outcomes
        .iter()
        .map(|o| o.output.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Executes the function calls of a model turn against the ticket store and
/// the command dispatcher
pub struct ToolCallInterpreter {
    store: Arc<dyn TicketStore>,
    dispatcher: Arc<CommandDispatcher>,
}

impl std::fmt::Debug for ToolCallInterpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCallInterpreter")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl ToolCallInterpreter {
    #[must_use]
    pub fn new(store: Arc<dyn TicketStore>, dispatcher: Arc<CommandDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// Process output items in order
    ///
    /// A failing call never stops the turn; it becomes an error outcome and
    /// the next call runs.
    pub async fn interpret(&self, ticket: &Ticket, output: &[OutputItem]) -> Interpretation {
        let mut interpretation = Interpretation::default();

        for item in output {
            match item {
                OutputItem::Message { content } => {
                    for part in content {
                        if let OutputContent::OutputText { text } = part {
                            interpretation.reply_text.push_str(text);
                        }
                    }
                }
                OutputItem::FunctionCall {
                    call_id,
                    name,
                    arguments,
                } => {
                    let (output, is_error) = match ToolInvocation::decode(name, arguments) {
                        Ok(invocation) => self.execute(ticket, invocation).await,
                        Err(e) => {
                            tracing::warn!(ticket_id = %ticket.id, tool = %name, error = %e, "rejected tool call");
                            (argument_error_message(&e), true)
                        }
                    };

                    interpretation.outcomes.push(ToolOutcome {
                        call_id: call_id.clone(),
                        name: name.clone(),
                        arguments: arguments.clone(),
                        output,
                        is_error,
                    });
                }
                OutputItem::Other => {}
            }
        }

        interpretation
    }

    async fn execute(&self, ticket: &Ticket, invocation: ToolInvocation) -> (String, bool) {
        match invocation {
            ToolInvocation::EscalateToHuman { reason } => {
                match self.store.escalate(&ticket.id, &reason) {
                    Ok(()) => {
                        tracing::info!(ticket_id = %ticket.id, reason = %reason, "ticket escalated");
                        (
                            format!("Ticket escalated to a human technician. Reason: {reason}"),
                            false,
                        )
                    }
                    Err(e) => {
                        tracing::error!(ticket_id = %ticket.id, error = %e, "failed to escalate ticket");
                        (format!("Failed to escalate ticket: {e}"), true)
                    }
                }
            }
            ToolInvocation::UpdateTicketPriority { priority } => {
                match self.store.set_priority(&ticket.id, priority) {
                    Ok(()) => {
                        tracing::info!(ticket_id = %ticket.id, priority = %priority, "ticket priority updated");
                        (format!("Ticket priority updated to {priority}"), false)
                    }
                    Err(e) => {
                        tracing::error!(ticket_id = %ticket.id, error = %e, "failed to update priority");
                        (format!("Failed to update ticket priority: {e}"), true)
                    }
                }
            }
            ToolInvocation::RunRemoteDiagnostic { command } => {
                let target = Identity::desktop_agent(&ticket.requester_id);
                match self.dispatcher.run(&target, &command).await {
                    Ok(output) => (format!("Command Output:\n{output}"), false),
                    Err(e) => (dispatch_error_message(&command, &e), true),
                }
            }
        }
    }
}

fn argument_error_message(error: &ToolArgumentError) -> String {
    format!("Invalid tool call: {error}")
}

/// Text the model sees when a diagnostic did not produce output
#[must_use]
pub fn dispatch_error_message(command: &str, error: &DispatchError) -> String {
    match error {
        DispatchError::NotAllowlisted(_) => {
            format!("Command '{command}' is not in the list of allowed diagnostic commands.")
        }
        DispatchError::NotConnected(_) => {
            "The user's desktop agent is not connected, so the command could not be run.".to_string()
        }
        DispatchError::Timeout(timeout) => format!(
            "The desktop agent did not respond to '{command}' within {} seconds.",
            timeout.as_secs()
        ),
        DispatchError::RemoteError(e) => format!("Command Error:\n{e}"),
        DispatchError::Disconnected(_) => {
            "The desktop agent disconnected before the command finished.".to_string()
        }
    }
}
