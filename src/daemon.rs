//! Daemon - the helpdesk bridge service
//!
//! Wires the ticket store, connection registry, command dispatcher, language
//! model and API server from a resolved [`Config`]

use std::sync::Arc;

use crate::agent::{AgentSettings, Orchestrator};
use crate::api::{ApiServer, ApiState};
use crate::connections::ConnectionRegistry;
use crate::db::{self, DbPool, SqliteTicketStore};
use crate::dispatch::{CommandDispatcher, WsCommandChannel};
use crate::llm::{LanguageModel, ResponsesClient};
use crate::security::Authenticator;
use crate::tickets::TicketStore;
use crate::{Config, Result};

/// Max tokens for model responses
const MAX_OUTPUT_TOKENS: u32 = 1024;

/// The helpdesk bridge daemon
#[derive(Debug)]
pub struct Daemon {
    port: u16,
    state: Arc<ApiState>,
}

impl Daemon {
    /// Build every component from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened or the model client
    /// cannot be built
    pub fn new(config: Config) -> Result<Self> {
        let db = db::init(&config.database_path)?;
        tracing::info!(path = %config.database_path.display(), "ticket store ready");

        let llm = ResponsesClient::new(
            config.llm.base_url.clone(),
            config.llm.api_key,
            config.llm.request_timeout,
        )?;
        let llm_configured = llm.is_configured();
        if llm_configured {
            tracing::info!(url = %config.llm.base_url, model = %config.llm.model, "language model configured");
        } else {
            tracing::warn!("no language model API key set, ticket replies will fail");
        }

        let authenticator = Authenticator::new(config.auth.jwt_secret.as_ref(), config.auth.tokens);
        if !authenticator.is_configured() {
            tracing::warn!("no connection credentials configured, all WebSocket handshakes will be refused");
        }

        let settings = AgentSettings {
            model: config.llm.model,
            history_limit: config.agent.history_limit,
            organization_name: config.agent.organization_name,
            max_output_tokens: Some(MAX_OUTPUT_TOKENS),
        };

        let state = build_state(
            db,
            Arc::new(llm),
            llm_configured,
            BridgeParts {
                api_key: config.server.api_key,
                authenticator,
                settings,
                bridge: config.bridge,
            },
        );

        Ok(Self {
            port: config.server.port,
            state,
        })
    }

    /// Serve until Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns error if the API server fails to bind or run
    pub async fn run(self) -> Result<()> {
        tracing::info!(
            port = self.port,
            commands = self.state.dispatcher.allowlist().len(),
            timeout_secs = self.state.dispatcher.timeout().as_secs(),
            reconnect_policy = ?self.state.registry.policy(),
            "starting helpdesk bridge"
        );

        let server = ApiServer::new(self.state, self.port);
        server
            .run(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("shutdown requested");
                }
            })
            .await?;

        tracing::info!("daemon stopped");
        Ok(())
    }
}

/// Settings consumed by [`build_state`] besides the store and model
#[derive(Debug)]
pub struct BridgeParts {
    pub api_key: Option<secrecy::SecretString>,
    pub authenticator: Authenticator,
    pub settings: AgentSettings,
    pub bridge: crate::config::BridgeConfig,
}

/// Assemble the API state around a database pool and a language model
#[must_use]
pub fn build_state(
    db: DbPool,
    model: Arc<dyn LanguageModel>,
    llm_configured: bool,
    parts: BridgeParts,
) -> Arc<ApiState> {
    let registry = Arc::new(ConnectionRegistry::with_policy(parts.bridge.reconnect_policy));
    let channel = Arc::new(WsCommandChannel::new(Arc::clone(&registry)));
    let dispatcher = Arc::new(CommandDispatcher::new(
        Arc::clone(&registry),
        channel.clone(),
        parts.bridge.allowed_commands,
        parts.bridge.command_timeout,
    ));

    let store: Arc<dyn TicketStore> = Arc::new(SqliteTicketStore::new(db.clone()));
    let orchestrator = Arc::new(Orchestrator::new(
        store,
        model,
        Arc::clone(&dispatcher),
        Arc::clone(&registry),
        parts.settings,
    ));

    Arc::new(ApiState {
        db,
        api_key: parts.api_key,
        registry,
        channel,
        dispatcher,
        orchestrator,
        authenticator: Arc::new(parts.authenticator),
        outbound_buffer: parts.bridge.outbound_buffer,
        llm_configured,
    })
}
