//! Command dispatcher: allowlist, correlate, send, await

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::allowlist::CommandAllowlist;
use super::channel::CommandChannel;
use super::pending::{PendingCallTable, Resolution};
use crate::connections::{
    CommandRequest, ConnectionId, CorrelationId, Identity, SharedConnectionRegistry,
};

/// Default bound on how long a dispatched command may take
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Output captured from a device command
pub type CommandOutput = String;

/// Why a dispatch did not produce command output
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Command is not on the allowlist; nothing was sent
    #[error("command '{0}' is not allowlisted")]
    NotAllowlisted(String),

    /// Target has no live connection; nothing was sent
    #[error("{0} is not connected")]
    NotConnected(Identity),

    /// No result arrived within the bound
    #[error("no response within {}s", .0.as_secs())]
    Timeout(Duration),

    /// Device reported an error running the command
    #[error("remote error: {0}")]
    RemoteError(String),

    /// Target disconnected while the command was in flight
    #[error("{0} disconnected before responding")]
    Disconnected(Identity),
}

/// Sends allowlisted commands to desktop agents and awaits their results
pub struct CommandDispatcher {
    registry: SharedConnectionRegistry,
    channel: Arc<dyn CommandChannel>,
    pending: Arc<PendingCallTable>,
    allowlist: CommandAllowlist,
    timeout: Duration,
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("pending", &self.pending)
            .field("allowlist", &self.allowlist)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Releases a pending entry when the awaiting future ends for any reason
///
/// Dropping a dispatch future mid-await (caller went away) frees the entry
/// immediately instead of leaving it until the deadline
struct PendingGuard<'a> {
    table: &'a PendingCallTable,
    correlation_id: CorrelationId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.table.claim(&self.correlation_id) {
            tracing::debug!(
                correlation_id = %self.correlation_id,
                "released pending call without a result"
            );
        }
    }
}

impl CommandDispatcher {
    /// Create a dispatcher and subscribe its pending table to the channel's results
    #[must_use]
    pub fn new(
        registry: SharedConnectionRegistry,
        channel: Arc<dyn CommandChannel>,
        allowlist: CommandAllowlist,
        timeout: Duration,
    ) -> Self {
        let pending = Arc::new(PendingCallTable::new());
        let table = Arc::clone(&pending);
        channel.on_result(Arc::new(move |result| {
            table.resolve(result);
        }));

        Self {
            registry,
            channel,
            pending,
            allowlist,
            timeout,
        }
    }

    /// Configured per-command timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub const fn allowlist(&self) -> &CommandAllowlist {
        &self.allowlist
    }

    /// In-flight call table
    #[must_use]
    pub fn pending(&self) -> &Arc<PendingCallTable> {
        &self.pending
    }

    /// Number of in-flight commands addressed to an identity
    #[must_use]
    pub fn in_flight_for(&self, target: &Identity) -> usize {
        self.pending.count_for(target)
    }

    /// Dispatch with the configured timeout
    ///
    /// # Errors
    ///
    /// See [`CommandDispatcher::dispatch`]
    pub async fn run(&self, target: &Identity, command: &str) -> Result<CommandOutput, DispatchError> {
        self.dispatch(target, command, self.timeout).await
    }

    /// Run an allowlisted command on a connected identity and wait for its output
    ///
    /// Many dispatches may be awaited concurrently; each owns its own
    /// correlation id and completion handle.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NotAllowlisted`] before any I/O
    /// - [`DispatchError::NotConnected`] immediately if the target is offline
    /// - [`DispatchError::Timeout`] if no result arrives within `timeout`
    /// - [`DispatchError::RemoteError`] if the device reports a failure
    /// - [`DispatchError::Disconnected`] if the target drops mid-flight
    pub async fn dispatch(
        &self,
        target: &Identity,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, DispatchError> {
        if !self.allowlist.is_allowed(command) {
            tracing::warn!(target = %target, command = %command, "rejected command outside allowlist");
            return Err(DispatchError::NotAllowlisted(command.to_string()));
        }

        if !self.registry.is_online(target).await {
            tracing::info!(target = %target, command = %command, "target offline, not dispatching");
            return Err(DispatchError::NotConnected(target.clone()));
        }

        let (correlation_id, mut receiver) = self.pending.register(target, command, timeout);
        let _guard = PendingGuard {
            table: &self.pending,
            correlation_id: correlation_id.clone(),
        };

        let request = CommandRequest {
            command: command.to_string(),
            correlation_id: correlation_id.clone(),
            target: target.clone(),
        };
        let Ok(connection_id) = self.channel.send(target, &request).await else {
            return Err(DispatchError::NotConnected(target.clone()));
        };
        self.bind_to_connection(target, &correlation_id, connection_id).await;

        let resolution = match tokio::time::timeout(timeout, &mut receiver).await {
            Ok(Ok(resolution)) => resolution,
            // Responder dropped without a value: the entry was torn down
            Ok(Err(_)) => Resolution::Disconnected,
            Err(_) => {
                if self.pending.claim(&correlation_id) {
                    tracing::warn!(
                        correlation_id = %correlation_id,
                        target = %target,
                        command = %command,
                        timeout_secs = timeout.as_secs(),
                        "command timed out"
                    );
                    return Err(DispatchError::Timeout(timeout));
                }
                // Lost the claim to a result or disconnect; the winner signals
                // before releasing the table, so this never waits
                (&mut receiver).await.unwrap_or(Resolution::Disconnected)
            }
        };

        match resolution {
            Resolution::Completed(Ok(output)) => {
                tracing::info!(correlation_id = %correlation_id, target = %target, "command completed");
                Ok(output)
            }
            Resolution::Completed(Err(error)) => {
                tracing::info!(correlation_id = %correlation_id, target = %target, error = %error, "command failed on device");
                Err(DispatchError::RemoteError(error))
            }
            Resolution::Disconnected => Err(DispatchError::Disconnected(target.clone())),
        }
    }

    /// Tag a sent call with its connection
    ///
    /// If that connection was replaced or closed while the request was in
    /// transit, its teardown may already have run, so the call is failed here
    async fn bind_to_connection(
        &self,
        target: &Identity,
        correlation_id: &CorrelationId,
        connection_id: ConnectionId,
    ) {
        if !self.pending.bind(correlation_id, connection_id) {
            return;
        }
        let current = self.registry.get(target).await.map(|c| c.id());
        if current != Some(connection_id) {
            self.fail_connection(connection_id);
        }
    }

    /// Fail every in-flight command pushed to a connection
    ///
    /// Called when the connection closes or is replaced. Commands already
    /// sent to a replacement connection for the same identity keep waiting.
    pub fn fail_connection(&self, connection_id: ConnectionId) -> usize {
        self.pending.fail_connection(connection_id)
    }

    /// Tear down a closed connection: unregister it and fail its in-flight calls
    ///
    /// A stale connection that was already replaced keeps the registry as is
    pub async fn connection_closed(&self, connection_id: ConnectionId) {
        let removed = self.registry.unregister_by_connection(connection_id).await;
        let failed = self.fail_connection(connection_id);
        match removed {
            Some(connection) => tracing::info!(
                identity = %connection.identity(),
                connection_id = %connection_id,
                failed,
                "connection unregistered"
            ),
            None => tracing::debug!(connection_id = %connection_id, failed, "stale connection closed"),
        }
    }
}
