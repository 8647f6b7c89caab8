//! Registry of live connections keyed by identity

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::types::{Connection, ConnectionId, Identity};

/// Shared connection registry
pub type SharedConnectionRegistry = Arc<ConnectionRegistry>;

/// What happens when an identity connects while already online
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// Newest connection wins; the previous one is handed back to be closed
    #[default]
    Replace,
    /// Keep the existing connection and refuse the newcomer
    Reject,
}

impl ReconnectPolicy {
    /// Parse from string representation
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "replace" => Some(Self::Replace),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// Result of registering a connection
#[derive(Debug)]
pub enum RegisterOutcome {
    /// Identity was offline
    Registered,
    /// Identity was online; the evicted connection is returned
    Replaced(Connection),
    /// Identity was online and the policy refused the new connection
    Rejected,
}

/// Registry of addressable connections, at most one per identity
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<Identity, Connection>>,
    policy: ReconnectPolicy,
}

impl ConnectionRegistry {
    /// Create an empty registry with the default reconnect policy
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry with an explicit reconnect policy
    #[must_use]
    pub fn with_policy(policy: ReconnectPolicy) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            policy,
        }
    }

    /// Policy applied when an online identity connects again
    #[must_use]
    pub const fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Register a connection under its identity
    pub async fn register(&self, connection: Connection) -> RegisterOutcome {
        let mut connections = self.connections.write().await;
        let identity = connection.identity().clone();

        if connections.contains_key(&identity) && self.policy == ReconnectPolicy::Reject {
            tracing::warn!(identity = %identity, "identity already connected, rejecting new connection");
            return RegisterOutcome::Rejected;
        }

        match connections.insert(identity.clone(), connection) {
            Some(previous) => {
                tracing::info!(
                    identity = %identity,
                    previous = %previous.id(),
                    "connection replaced by reconnect"
                );
                RegisterOutcome::Replaced(previous)
            }
            None => {
                tracing::info!(identity = %identity, "connection registered");
                RegisterOutcome::Registered
            }
        }
    }

    /// Remove whatever connection is registered for an identity
    pub async fn unregister(&self, identity: &Identity) -> Option<Connection> {
        self.connections.write().await.remove(identity)
    }

    /// Remove a connection by its id
    ///
    /// Only removes the mapping if this connection is still the current one
    /// for its identity, so a stale socket closing after a reconnect leaves the
    /// new connection in place
    pub async fn unregister_by_connection(&self, connection_id: ConnectionId) -> Option<Connection> {
        let mut connections = self.connections.write().await;
        let identity = connections
            .iter()
            .find(|(_, conn)| conn.id() == connection_id)
            .map(|(identity, _)| identity.clone())?;
        connections.remove(&identity)
    }

    /// Whether the identity currently holds a live connection
    pub async fn is_online(&self, identity: &Identity) -> bool {
        self.connections.read().await.contains_key(identity)
    }

    /// Get the current connection for an identity
    pub async fn get(&self, identity: &Identity) -> Option<Connection> {
        self.connections.read().await.get(identity).cloned()
    }

    /// Snapshot of all live connections
    pub async fn list(&self) -> Vec<Connection> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Number of live connections
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Whether no connections are registered
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}
