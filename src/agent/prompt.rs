//! Instructions and conversation input for the support agent

use std::fmt::Write as _;

use crate::dispatch::CommandAllowlist;
use crate::llm::InputItem;
use crate::tickets::{ConversationTurn, Ticket};

/// Build the instructions for one ticket turn
#[must_use]
pub fn build_instructions(
    organization_name: &str,
    ticket: &Ticket,
    allowlist: &CommandAllowlist,
) -> String {
    let organization = ticket
        .organization
        .as_deref()
        .unwrap_or(organization_name);

    let mut prompt = format!(
        "You are the IT support assistant for {organization}. You are helping a user \
         with a support ticket.\n\n\
         ## Ticket\n\
         - Subject: {}\n\
         - Priority: {}\n",
        ticket.subject, ticket.priority
    );
    if ticket.escalated {
        prompt.push_str("- Already escalated to a human technician\n");
    }

    prompt.push_str(
        "\n## Remote diagnostics\n\
         You can run these commands on the user's computer with run_remote_diagnostic. \
         Only these exact commands are available:\n",
    );
    for command in allowlist.commands() {
        let _ = writeln!(prompt, "- {command}");
    }

    prompt.push_str(
        "\nExplain results in plain language. If the problem needs hands-on work or the \
         user asks for a person, use escalate_to_human. Adjust the ticket priority with \
         update_ticket_priority when the impact is clearly higher or lower than recorded.",
    );

    prompt
}

/// Conversation history as model input, oldest first
#[must_use]
pub fn history_input(turns: &[ConversationTurn]) -> Vec<InputItem> {
    turns
        .iter()
        .map(|turn| InputItem::Message {
            role: turn.role,
            content: turn.content.clone(),
        })
        .collect()
}
