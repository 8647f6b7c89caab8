//! Command channel: push requests to a device, fan inbound results out

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::connections::{
    CommandRequest, CommandResult, ConnectionId, Identity, ServerFrame, SharedConnectionRegistry,
};

/// Callback invoked for every inbound command result
///
/// Runs on the transport task that received the frame and must not block
pub type ResultHandler = Arc<dyn Fn(CommandResult) + Send + Sync>;

/// The addressed identity has no live connection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0} is not connected")]
pub struct NotConnected(pub Identity);

/// Duplex per-identity channel used by the dispatcher
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Deliver a request at most once to the identity's live connection
    ///
    /// Returns the id of the connection the request was pushed to
    ///
    /// # Errors
    ///
    /// Returns [`NotConnected`] immediately if the identity is offline or its
    /// connection cannot accept the frame
    async fn send(
        &self,
        target: &Identity,
        request: &CommandRequest,
    ) -> Result<ConnectionId, NotConnected>;

    /// Subscribe to inbound results
    fn on_result(&self, handler: ResultHandler);
}

/// Command channel backed by the WebSocket connection registry
pub struct WsCommandChannel {
    registry: SharedConnectionRegistry,
    handlers: RwLock<Vec<ResultHandler>>,
}

impl std::fmt::Debug for WsCommandChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsCommandChannel").finish_non_exhaustive()
    }
}

impl WsCommandChannel {
    #[must_use]
    pub fn new(registry: SharedConnectionRegistry) -> Self {
        Self {
            registry,
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Hand a result frame read off a socket to every subscriber
    pub fn deliver(&self, result: &CommandResult) {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if handlers.is_empty() {
            tracing::warn!(correlation_id = %result.correlation_id, "no result subscribers");
        }
        for handler in handlers {
            handler(result.clone());
        }
    }
}

#[async_trait]
impl CommandChannel for WsCommandChannel {
    async fn send(&self, target: &Identity, request: &CommandRequest) -> Result<ConnectionId, NotConnected> {
        let Some(connection) = self.registry.get(target).await else {
            return Err(NotConnected(target.clone()));
        };

        if connection.push(ServerFrame::ExecuteCommand(request.clone())) {
            tracing::info!(
                target = %target,
                connection_id = %connection.id(),
                correlation_id = %request.correlation_id,
                command = %request.command,
                "command sent to desktop agent"
            );
            Ok(connection.id())
        } else {
            Err(NotConnected(target.clone()))
        }
    }

    fn on_result(&self, handler: ResultHandler) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }
}
