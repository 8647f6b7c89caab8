//! Function tools available to the support agent

pub mod interpreter;
pub mod schema;

pub use interpreter::{
    Interpretation, ToolCallInterpreter, ToolOutcome, dispatch_error_message, join_outputs,
};
pub use schema::{
    ESCALATE_TO_HUMAN, RUN_REMOTE_DIAGNOSTIC, ToolArgumentError, ToolInvocation,
    UPDATE_TICKET_PRIORITY, tool_definitions,
};
