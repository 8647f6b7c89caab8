//! Live connection registry for desktop agents and requesters
//!
//! Every authenticated WebSocket is registered here under its identity so the
//! dispatcher can address a specific user's device

pub mod registry;
pub mod types;

pub use registry::{ConnectionRegistry, ReconnectPolicy, RegisterOutcome, SharedConnectionRegistry};
pub use types::{
    ClientFrame, CommandRequest, CommandResult, Connection, ConnectionId, ConnectionRole,
    CorrelationId, Identity, ServerFrame,
};
