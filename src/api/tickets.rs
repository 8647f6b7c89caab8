//! Orchestrator entry endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::post,
};
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::Error;
use crate::agent::GENERIC_FAILURE_REPLY;

/// `POST /api/ai/respond` body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondBody {
    pub ticket_id: String,
    pub content: String,
}

/// `POST /api/tickets/{ticket_id}/messages` body
#[derive(Debug, Deserialize)]
pub struct MessageBody {
    pub content: String,
}

/// Tool call executed during the turn
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallSummary {
    pub name: String,
    pub is_error: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondResponse {
    pub ai_response: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallSummary>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Build ticket routes
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/ai/respond", post(respond))
        .route("/tickets/{ticket_id}/messages", post(post_message))
        .with_state(state)
}

async fn respond(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<RespondBody>,
) -> Result<Json<RespondResponse>, ApiError> {
    run_turn(&state, &body.ticket_id, &body.content).await
}

async fn post_message(
    State(state): State<Arc<ApiState>>,
    Path(ticket_id): Path<String>,
    Json(body): Json<MessageBody>,
) -> Result<Json<RespondResponse>, ApiError> {
    run_turn(&state, &ticket_id, &body.content).await
}

async fn run_turn(
    state: &ApiState,
    ticket_id: &str,
    content: &str,
) -> Result<Json<RespondResponse>, ApiError> {
    if ticket_id.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "ticketId is required"));
    }
    if content.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "content must not be empty"));
    }

    match state.orchestrator.handle_message(ticket_id, content).await {
        Ok(reply) => Ok(Json(RespondResponse {
            ai_response: reply.text,
            tool_calls: reply
                .tool_outcomes
                .into_iter()
                .map(|o| ToolCallSummary {
                    name: o.name,
                    is_error: o.is_error,
                })
                .collect(),
        })),
        Err(Error::NotFound(what)) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("{what} not found"),
        )),
        Err(Error::Llm(_)) => Err(api_error(StatusCode::BAD_GATEWAY, GENERIC_FAILURE_REPLY)),
        Err(e) => {
            tracing::error!(ticket_id = %ticket_id, error = %e, "ticket turn failed");
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                GENERIC_FAILURE_REPLY,
            ))
        }
    }
}
