//! Liveness and readiness probes

use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;

use super::ApiState;
use crate::connections::ConnectionRole;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// `/ready` body
#[derive(Serialize)]
pub struct ReadinessResponse {
    /// `ok` when the ticket store answers; other checks only inform
    pub status: &'static str,
    pub checks: ReadinessChecks,
    /// Live connections of both roles
    pub connections: usize,
    pub desktop_agents: usize,
    /// Commands awaiting a device result
    pub pending_commands: usize,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub database: Check,
    pub llm: Check,
    pub credentials: Check,
}

#[derive(Serialize)]
pub struct Check {
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Fail,
    Unavailable,
}

impl Check {
    const OK: Self = Self {
        status: CheckStatus::Ok,
        detail: None,
    };

    fn unavailable(detail: &str) -> Self {
        Self {
            status: CheckStatus::Unavailable,
            detail: Some(detail.to_string()),
        }
    }

    fn configured(yes: bool, detail: &str) -> Self {
        if yes { Self::OK } else { Self::unavailable(detail) }
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ready(State(state): State<Arc<ApiState>>) -> (StatusCode, Json<ReadinessResponse>) {
    let database = probe_ticket_store(&state);
    let ready = database.status == CheckStatus::Ok;

    let connections = state.registry.list().await;
    let desktop_agents = connections
        .iter()
        .filter(|c| c.identity().role == ConnectionRole::DesktopAgent)
        .count();

    let body = ReadinessResponse {
        status: if ready { "ok" } else { "degraded" },
        checks: ReadinessChecks {
            database,
            llm: Check::configured(state.llm_configured, "no API key configured"),
            credentials: Check::configured(
                state.authenticator.is_configured(),
                "no handshake credentials configured",
            ),
        },
        connections: connections.len(),
        desktop_agents,
        pending_commands: state.dispatcher.pending().len(),
    };

    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body))
}

fn probe_ticket_store(state: &ApiState) -> Check {
    let outcome = state
        .db
        .get()
        .map_err(|e| e.to_string())
        .and_then(|conn| {
            conn.query_row("SELECT COUNT(*) FROM tickets", [], |row| row.get::<_, i64>(0))
                .map_err(|e| e.to_string())
        });

    match outcome {
        Ok(_) => Check::OK,
        Err(e) => Check {
            status: CheckStatus::Fail,
            detail: Some(e),
        },
    }
}

/// `/health`, no state needed
pub fn router() -> Router {
    Router::new().route("/health", get(health))
}

/// `/ready`
pub fn ready_router(state: Arc<ApiState>) -> Router {
    Router::new().route("/ready", get(ready)).with_state(state)
}
