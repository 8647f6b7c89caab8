//! Ticket store collaborator
//!
//! The bridge does not own tickets. It reads a ticket and its recent
//! conversation, appends messages, and applies the two mutations its tools
//! expose (priority change and escalation). [`crate::db::SqliteTicketStore`]
//! is the bundled implementation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::llm::Role;

/// Ticket priority as exposed to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown priority '{s}'"))
    }
}

/// A support ticket as seen by the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub id: String,
    /// Subject of the user who opened the ticket; their desktop agent is
    /// the target of remote diagnostics
    pub requester_id: String,
    pub subject: String,
    pub organization: Option<String>,
    pub priority: Priority,
    pub escalated: bool,
    pub escalation_reason: Option<String>,
}

/// One persisted conversation message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Persistence the orchestrator and tool layer depend on
pub trait TicketStore: Send + Sync {
    /// Load a ticket
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for an unknown id, or a storage error
    fn ticket(&self, ticket_id: &str) -> Result<Ticket>;

    /// Append a message to a ticket's conversation
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    fn append_message(&self, ticket_id: &str, role: Role, content: &str) -> Result<()>;

    /// Most recent `limit` messages, oldest first
    ///
    /// # Errors
    ///
    /// Returns error if the read fails
    fn recent_messages(&self, ticket_id: &str, limit: usize) -> Result<Vec<ConversationTurn>>;

    /// Change a ticket's priority
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for an unknown id, or a storage error
    fn set_priority(&self, ticket_id: &str, priority: Priority) -> Result<()>;

    /// Flag a ticket for human follow-up
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for an unknown id, or a storage error
    fn escalate(&self, ticket_id: &str, reason: &str) -> Result<()>;
}
