//! Connection and wire frame types

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, mpsc};
use uuid::Uuid;

/// Which side of the helpdesk a connection belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionRole {
    /// Desktop agent installed on the end user's machine
    DesktopAgent,
    /// Requester's browser session
    Requester,
}

impl ConnectionRole {
    /// Parse from a path segment or config value
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "agent" | "desktop" | "desktop_agent" => Some(Self::DesktopAgent),
            "requester" | "user" => Some(Self::Requester),
            _ => None,
        }
    }

    /// Stable string form
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DesktopAgent => "desktop_agent",
            Self::Requester => "requester",
        }
    }
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated principal as seen by the registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user identifier issued by the auth system
    pub subject: String,
    pub role: ConnectionRole,
}

impl Identity {
    #[must_use]
    pub fn new(subject: impl Into<String>, role: ConnectionRole) -> Self {
        Self {
            subject: subject.into(),
            role,
        }
    }

    /// Identity of a user's desktop agent
    #[must_use]
    pub fn desktop_agent(subject: impl Into<String>) -> Self {
        Self::new(subject, ConnectionRole::DesktopAgent)
    }

    /// Identity of a requester's browser session
    #[must_use]
    pub fn requester(subject: impl Into<String>) -> Self {
        Self::new(subject, ConnectionRole::Requester)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role, self.subject)
    }
}

/// Unique id of one physical connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque token pairing a dispatched command with its result
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh random correlation id
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Command execution request pushed to a desktop agent
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    pub command: String,
    pub correlation_id: CorrelationId,
    /// Addressed identity; routing only, never sent on the wire
    #[serde(skip_serializing)]
    pub target: Identity,
}

/// Result reported by a desktop agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub correlation_id: CorrelationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResult {
    /// Successful result with captured output
    #[must_use]
    pub fn output(correlation_id: impl Into<CorrelationId>, output: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            output: Some(output.into()),
            error: None,
        }
    }

    /// Failed result with the device-side error
    #[must_use]
    pub fn error(correlation_id: impl Into<CorrelationId>, error: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            output: None,
            error: Some(error.into()),
        }
    }

    /// Collapse into output or remote error; an error field wins over output
    pub fn into_outcome(self) -> Result<String, String> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.output.unwrap_or_default()),
        }
    }
}

/// Frame sent from the gateway to a connected client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Handshake accepted and registered
    Connected {
        connection_id: ConnectionId,
        identity: String,
    },
    /// Run an allowlisted command on the device
    ExecuteCommand(CommandRequest),
    /// New assistant reply on one of the requester's tickets
    TicketReply { ticket_id: String, content: String },
    /// Error message
    Error { code: String, message: String },
    /// Keepalive reply
    Pong,
}

/// Frame received from a connected client
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Result of a previously dispatched command
    CommandResult(CommandResult),
    /// Keepalive ping
    Ping,
}

/// An open, addressable channel bound to one identity
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    identity: Identity,
    sender: mpsc::Sender<ServerFrame>,
    closed: Arc<Notify>,
    connected_at: DateTime<Utc>,
}

impl Connection {
    /// Wrap the outbound queue of a freshly authenticated socket
    #[must_use]
    pub fn new(identity: Identity, sender: mpsc::Sender<ServerFrame>) -> Self {
        Self {
            id: ConnectionId::generate(),
            identity,
            sender,
            closed: Arc::new(Notify::new()),
            connected_at: Utc::now(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    #[must_use]
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Queue a frame without waiting
    ///
    /// Returns false if the socket is gone or its queue is full
    pub fn push(&self, frame: ServerFrame) -> bool {
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(connection_id = %self.id, identity = %self.identity, "outbound queue full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Ask the socket task owning this connection to shut down
    pub fn close(&self) {
        self.closed.notify_one();
    }

    /// Resolves once `close` has been called
    pub async fn closed(&self) {
        self.closed.notified().await;
    }
}
