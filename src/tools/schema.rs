//! Tool definitions exposed to the model and typed decoding of its calls

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;

use crate::dispatch::CommandAllowlist;
use crate::llm::ToolDefinition;
use crate::tickets::Priority;

pub const ESCALATE_TO_HUMAN: &str = "escalate_to_human";
pub const UPDATE_TICKET_PRIORITY: &str = "update_ticket_priority";
pub const RUN_REMOTE_DIAGNOSTIC: &str = "run_remote_diagnostic";

/// A function call the model made that could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolArgumentError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    /// Arguments were not a JSON object
    #[error("malformed arguments for {tool}: {reason}")]
    Malformed { tool: String, reason: String },

    /// Arguments did not match the tool's schema
    #[error("invalid arguments for {tool}: {reason}")]
    Invalid { tool: String, reason: String },
}

/// Decoded function call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    EscalateToHuman { reason: String },
    UpdateTicketPriority { priority: Priority },
    RunRemoteDiagnostic { command: String },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct EscalateArgs {
    reason: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PriorityArgs {
    priority: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DiagnosticArgs {
    command: String,
}

impl ToolInvocation {
    /// Decode `{name, arguments}` into a typed invocation
    ///
    /// The command of a diagnostic is not checked here; the dispatcher owns
    /// the allowlist.
    ///
    /// # Errors
    ///
    /// Returns [`ToolArgumentError`] for an unknown name, non-JSON arguments,
    /// or arguments that do not fit the tool's schema
    pub fn decode(name: &str, arguments: &str) -> Result<Self, ToolArgumentError> {
        match name {
            ESCALATE_TO_HUMAN => {
                let args: EscalateArgs = parse_args(name, arguments)?;
                let reason = args.reason.trim();
                if reason.is_empty() {
                    return Err(invalid(name, "reason must not be empty"));
                }
                Ok(Self::EscalateToHuman {
                    reason: reason.to_string(),
                })
            }
            UPDATE_TICKET_PRIORITY => {
                let args: PriorityArgs = parse_args(name, arguments)?;
                let priority = args.priority.parse().map_err(|e: String| invalid(name, &e))?;
                Ok(Self::UpdateTicketPriority { priority })
            }
            RUN_REMOTE_DIAGNOSTIC => {
                let args: DiagnosticArgs = parse_args(name, arguments)?;
                Ok(Self::RunRemoteDiagnostic {
                    command: args.command,
                })
            }
            other => Err(ToolArgumentError::UnknownTool(other.to_string())),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::EscalateToHuman { .. } => ESCALATE_TO_HUMAN,
            Self::UpdateTicketPriority { .. } => UPDATE_TICKET_PRIORITY,
            Self::RunRemoteDiagnostic { .. } => RUN_REMOTE_DIAGNOSTIC,
        }
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: &str) -> Result<T, ToolArgumentError> {
    let value: serde_json::Value =
        serde_json::from_str(arguments).map_err(|e| ToolArgumentError::Malformed {
            tool: tool.to_string(),
            reason: e.to_string(),
        })?;
    if !value.is_object() {
        return Err(ToolArgumentError::Malformed {
            tool: tool.to_string(),
            reason: "expected a JSON object".to_string(),
        });
    }
    serde_json::from_value(value).map_err(|e| invalid(tool, &e.to_string()))
}

fn invalid(tool: &str, reason: &str) -> ToolArgumentError {
    ToolArgumentError::Invalid {
        tool: tool.to_string(),
        reason: reason.to_string(),
    }
}

/// The three function tools, with the diagnostic command constrained to the allowlist
#[must_use]
pub fn tool_definitions(allowlist: &CommandAllowlist) -> Vec<ToolDefinition> {
    let priorities: Vec<&str> = Priority::ALL.iter().map(|p| p.as_str()).collect();

    vec![
        ToolDefinition::function(
            ESCALATE_TO_HUMAN,
            "Flag the ticket for follow-up by a human technician. Use when the issue \
             cannot be resolved remotely or the user asks for a person.",
            json!({
                "type": "object",
                "properties": {
                    "reason": {
                        "type": "string",
                        "description": "Why a human needs to take over"
                    }
                },
                "required": ["reason"],
                "additionalProperties": false
            }),
        ),
        ToolDefinition::function(
            UPDATE_TICKET_PRIORITY,
            "Change the priority of the current ticket.",
            json!({
                "type": "object",
                "properties": {
                    "priority": {
                        "type": "string",
                        "enum": priorities
                    }
                },
                "required": ["priority"],
                "additionalProperties": false
            }),
        ),
        ToolDefinition::function(
            RUN_REMOTE_DIAGNOSTIC,
            "Run a read-only diagnostic command on the user's computer through their \
             desktop agent and return its output.",
            json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "enum": allowlist.commands()
                    }
                },
                "required": ["command"],
                "additionalProperties": false
            }),
        ),
    ]
}
