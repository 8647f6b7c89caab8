//! WebSocket endpoints for desktop agents and requesters
//!
//! The bearer credential is checked before the upgrade, so a bad token gets
//! a plain 401 and never reaches the registry. After the upgrade the socket
//! is registered under its identity, a writer task drains the connection's
//! outbound queue, and inbound `command_result` frames are handed to the
//! command channel.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket, rejection::WebSocketUpgradeRejection},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use super::ApiState;
use super::auth::bearer_token;
use crate::connections::{
    ClientFrame, Connection, ConnectionRole, Identity, RegisterOutcome, ServerFrame,
};

/// Optional query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// Build WebSocket router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/agent", get(agent_upgrade))
        .route("/requester", get(requester_upgrade))
        .with_state(state)
}

async fn agent_upgrade(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    upgrade(state, ConnectionRole::DesktopAgent, &headers, query, ws)
}

async fn requester_upgrade(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    upgrade(state, ConnectionRole::Requester, &headers, query, ws)
}

/// Authenticate, then upgrade
fn upgrade(
    state: Arc<ApiState>,
    role: ConnectionRole,
    headers: &HeaderMap,
    query: WsQuery,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let token = bearer_token(headers)
        .map(str::to_string)
        .or(query.token)
        .unwrap_or_default();

    let identity = match state.authenticator.authenticate(&token, role) {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(role = %role, error = %e, "rejected WebSocket handshake");
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "unauthorized" })),
            )
                .into_response();
        }
    };

    match ws {
        Ok(ws) => ws
            .on_upgrade(move |socket| handle_socket(socket, state, identity))
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

/// Handle an authenticated WebSocket for its whole lifetime
async fn handle_socket(socket: WebSocket, state: Arc<ApiState>, identity: Identity) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<ServerFrame>(state.outbound_buffer);
    let connection = Connection::new(identity.clone(), tx);
    let connection_id = connection.id();

    match state.registry.register(connection.clone()).await {
        RegisterOutcome::Registered => {}
        RegisterOutcome::Replaced(previous) => {
            let failed = state.dispatcher.fail_connection(previous.id());
            previous.close();
            tracing::info!(
                identity = %identity,
                previous = %previous.id(),
                failed,
                "replaced existing connection"
            );
        }
        RegisterOutcome::Rejected => {
            tracing::warn!(identity = %identity, "identity already connected, rejecting");
            let error = ServerFrame::Error {
                code: "already_connected".to_string(),
                message: "another connection is active for this identity".to_string(),
            };
            if let Ok(msg) = serde_json::to_string(&error) {
                let _ = sender.send(Message::Text(msg.into())).await;
            }
            let _ = sender.close().await;
            return;
        }
    }

    connection.push(ServerFrame::Connected {
        connection_id,
        identity: identity.to_string(),
    });
    tracing::info!(identity = %identity, connection_id = %connection_id, "WebSocket connected");

    // Spawn task to forward queued frames to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match serde_json::to_string(&frame) {
                Ok(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!(error = %e, "failed to encode frame"),
            }
        }
    });

    // Handle incoming frames
    let recv_state = Arc::clone(&state);
    let recv_connection = connection.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Some(reply) = handle_frame(&recv_state, recv_connection.identity(), &text) {
                        recv_connection.push(reply);
                    }
                }
                Message::Close(_) => {
                    tracing::info!(identity = %recv_connection.identity(), "WebSocket closed by client");
                    break;
                }
                _ => {}
            }
        }
    });

    // Wait for either task to complete or a forced close
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
        () = connection.closed() => {
            tracing::info!(identity = %identity, connection_id = %connection_id, "closing superseded connection");
            send_task.abort();
            recv_task.abort();
        }
    }

    state.dispatcher.connection_closed(connection_id).await;
    tracing::info!(identity = %identity, connection_id = %connection_id, "WebSocket disconnected");
}

/// Process one inbound text frame, returning an immediate reply if any
pub fn handle_frame(state: &ApiState, identity: &Identity, text: &str) -> Option<ServerFrame> {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(identity = %identity, error = %e, "invalid frame");
            return Some(ServerFrame::Error {
                code: "invalid_message".to_string(),
                message: e.to_string(),
            });
        }
    };

    match frame {
        ClientFrame::Ping => Some(ServerFrame::Pong),
        ClientFrame::CommandResult(result) => {
            if identity.role != ConnectionRole::DesktopAgent {
                tracing::warn!(identity = %identity, "command result from a non-agent connection");
                return Some(ServerFrame::Error {
                    code: "unexpected_frame".to_string(),
                    message: "only desktop agents report command results".to_string(),
                });
            }

            // A result may only settle a command that was sent to this identity
            if let Some(target) = state.dispatcher.pending().target_of(&result.correlation_id)
                && &target != identity
            {
                tracing::warn!(
                    identity = %identity,
                    target = %target,
                    correlation_id = %result.correlation_id,
                    "dropping result for another identity's command"
                );
                return None;
            }

            state.channel.deliver(&result);
            None
        }
    }
}
