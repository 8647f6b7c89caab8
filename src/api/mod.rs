//! HTTP and WebSocket API for the helpdesk bridge

mod auth;
pub mod connections;
pub mod health;
pub mod tickets;
pub mod ws;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use secrecy::SecretString;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::agent::Orchestrator;
use crate::connections::SharedConnectionRegistry;
use crate::db::DbPool;
use crate::dispatch::{CommandDispatcher, WsCommandChannel};
use crate::security::Authenticator;

pub use auth::bearer_token;

/// Shared state for API handlers
pub struct ApiState {
    pub db: DbPool,
    /// Required on `/api/*` when set
    pub api_key: Option<SecretString>,
    pub registry: SharedConnectionRegistry,
    /// Receives `command_result` frames read off agent sockets
    pub channel: Arc<WsCommandChannel>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub orchestrator: Arc<Orchestrator>,
    pub authenticator: Arc<Authenticator>,
    /// Outbound frame queue size per connection
    pub outbound_buffer: usize,
    pub llm_configured: bool,
}

impl std::fmt::Debug for ApiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiState")
            .field("dispatcher", &self.dispatcher)
            .field("authenticator", &self.authenticator)
            .field("llm_configured", &self.llm_configured)
            .finish_non_exhaustive()
    }
}

/// Build the router with all routes
pub fn router(state: Arc<ApiState>) -> Router {
    let api = Router::new()
        .merge(tickets::router(state.clone()))
        .nest("/connections", connections::router(state.clone()))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    let router = Router::new()
        .nest("/api", api)
        .nest("/ws", ws::router(state.clone()))
        .merge(health::router())
        .merge(health::ready_router(state));

    // CORS layer for cross-origin requests from the helpdesk frontend
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router.layer(cors).layer(TraceLayer::new_for_http())
}

/// API server
#[derive(Debug)]
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    #[must_use]
    pub const fn new(state: Arc<ApiState>, port: u16) -> Self {
        Self { state, port }
    }

    /// Bind the configured port and serve until `shutdown` resolves
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(("0.0.0.0", self.port)).await?;

        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// # Errors
    ///
    /// Returns error if the server fails
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "API server listening");
        }

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("API server stopped");
        Ok(())
    }
}
