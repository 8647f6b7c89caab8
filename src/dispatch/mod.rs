//! Remote command dispatch to desktop agents
//!
//! A dispatch validates the command against the allowlist, registers a
//! pending call under a fresh correlation id, pushes the request over the
//! command channel and waits (bounded) for the matching result

pub mod allowlist;
pub mod channel;
pub mod dispatcher;
pub mod pending;

pub use allowlist::{CommandAllowlist, DEFAULT_ALLOWED_COMMANDS};
pub use channel::{CommandChannel, NotConnected, ResultHandler, WsCommandChannel};
pub use dispatcher::{CommandDispatcher, CommandOutput, DEFAULT_COMMAND_TIMEOUT, DispatchError};
pub use pending::{PendingCall, PendingCallTable, Resolution};
