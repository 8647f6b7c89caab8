//! Connection registry endpoints
//!
//! Lists live connections and lets an operator dispatch an allowlisted
//! command to a connected desktop agent

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::connections::{Connection, ConnectionRole, Identity};
use crate::dispatch::{DispatchError, PendingCall};

/// Upper bound accepted for an operator-supplied timeout
const MAX_TIMEOUT_MS: u64 = 300_000;

/// REST response for a live connection
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionResponse {
    pub connection_id: String,
    pub subject: String,
    pub role: ConnectionRole,
    pub connected_at: String,
    /// Commands awaiting a result from this identity
    pub in_flight: usize,
    /// Detail of each in-flight command, only on single-connection lookups
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commands: Option<Vec<PendingCommandResponse>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCommandResponse {
    pub correlation_id: String,
    pub command: String,
    pub deadline: String,
}

impl From<PendingCall> for PendingCommandResponse {
    fn from(call: PendingCall) -> Self {
        Self {
            correlation_id: call.correlation_id.to_string(),
            command: call.command,
            deadline: call.deadline.to_rfc3339(),
        }
    }
}

impl ConnectionResponse {
    fn new(connection: &Connection, in_flight: usize) -> Self {
        Self {
            connection_id: connection.id().to_string(),
            subject: connection.identity().subject.clone(),
            role: connection.identity().role,
            connected_at: connection.connected_at().to_rfc3339(),
            in_flight,
            commands: None,
        }
    }
}

/// REST request for dispatching a command
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandBody {
    pub command: String,
    pub timeout_ms: Option<u64>,
}

/// REST response for a dispatched command
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Build connection routes
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(list_connections))
        .route("/{role}/{subject}", get(get_connection))
        .route("/{role}/{subject}/commands", post(dispatch_command))
        .with_state(state)
}

/// List all live connections
async fn list_connections(State(state): State<Arc<ApiState>>) -> Json<Vec<ConnectionResponse>> {
    let mut connections: Vec<ConnectionResponse> = state
        .registry
        .list()
        .await
        .iter()
        .map(|c| ConnectionResponse::new(c, state.dispatcher.in_flight_for(c.identity())))
        .collect();
    connections.sort_by(|a, b| a.subject.cmp(&b.subject).then(a.role.as_str().cmp(b.role.as_str())));
    Json(connections)
}

/// Get the live connection of one identity
async fn get_connection(
    State(state): State<Arc<ApiState>>,
    Path((role, subject)): Path<(String, String)>,
) -> Result<Json<ConnectionResponse>, StatusCode> {
    let role = ConnectionRole::parse(&role).ok_or(StatusCode::BAD_REQUEST)?;
    let identity = Identity::new(subject, role);

    let connection = state.registry.get(&identity).await.ok_or(StatusCode::NOT_FOUND)?;
    let calls = state.dispatcher.pending().calls_for(&identity);

    let mut response = ConnectionResponse::new(&connection, calls.len());
    response.commands = Some(calls.into_iter().map(PendingCommandResponse::from).collect());
    Ok(Json(response))
}

/// Run an allowlisted command on a connected desktop agent
async fn dispatch_command(
    State(state): State<Arc<ApiState>>,
    Path((role, subject)): Path<(String, String)>,
    Json(body): Json<CommandBody>,
) -> (StatusCode, Json<CommandResponse>) {
    let err = |code: StatusCode, msg: String| {
        (
            code,
            Json(CommandResponse {
                ok: false,
                output: None,
                error: Some(msg),
            }),
        )
    };

    if ConnectionRole::parse(&role) != Some(ConnectionRole::DesktopAgent) {
        return err(
            StatusCode::BAD_REQUEST,
            "commands can only be sent to desktop agents".to_string(),
        );
    }

    let timeout = body
        .timeout_ms
        .map_or(state.dispatcher.timeout(), |ms| {
            Duration::from_millis(ms.clamp(1, MAX_TIMEOUT_MS))
        });
    let target = Identity::desktop_agent(subject);

    tracing::info!(target = %target, command = %body.command, "operator dispatch");

    match state.dispatcher.dispatch(&target, &body.command, timeout).await {
        Ok(output) => (
            StatusCode::OK,
            Json(CommandResponse {
                ok: true,
                output: Some(output),
                error: None,
            }),
        ),
        Err(e) => {
            let status = match &e {
                DispatchError::NotAllowlisted(_) => StatusCode::FORBIDDEN,
                DispatchError::NotConnected(_) => StatusCode::NOT_FOUND,
                DispatchError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                DispatchError::RemoteError(_) => StatusCode::OK,
                DispatchError::Disconnected(_) => StatusCode::BAD_GATEWAY,
            };
            err(status, e.to_string())
        }
    }
}
