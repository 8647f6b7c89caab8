//! Shared test utilities
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use helpdesk_bridge::agent::AgentSettings;
use helpdesk_bridge::api::ApiState;
use helpdesk_bridge::config::BridgeConfig;
use helpdesk_bridge::connections::{
    CommandRequest, CommandResult, Connection, ConnectionRegistry, Identity, ReconnectPolicy,
    ServerFrame, SharedConnectionRegistry,
};
use helpdesk_bridge::daemon::{BridgeParts, build_state};
use helpdesk_bridge::db::{self, NewTicket, SqliteTicketStore};
use helpdesk_bridge::dispatch::{CommandAllowlist, WsCommandChannel};
use helpdesk_bridge::llm::{LanguageModel, LlmError, ModelResponse, OutputItem, ResponseRequest};
use helpdesk_bridge::security::Authenticator;
use helpdesk_bridge::tickets::{Priority, Ticket};
use helpdesk_bridge::DbPool;

pub const TEST_API_KEY: &str = "test-api-key";
pub const AGENT_TOKEN: &str = "agent-token-user1";
pub const REQUESTER_TOKEN: &str = "requester-token-user1";

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Create a ticket opened by `requester`
pub fn create_test_ticket(db: &DbPool, requester: &str) -> Ticket {
    SqliteTicketStore::new(db.clone())
        .create_ticket(NewTicket {
            requester_id: requester.to_string(),
            subject: "Laptop cannot reach the VPN".to_string(),
            organization: Some("Acme".to_string()),
            priority: Priority::Medium,
        })
        .expect("failed to create test ticket")
}

/// Language model that replays scripted responses and records every request
#[derive(Default)]
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<ModelResponse, LlmError>>>,
    requests: Mutex<Vec<ResponseRequest>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Result<ModelResponse, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ResponseRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn respond(&self, request: &ResponseRequest) -> Result<ModelResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(LlmError::NotConfigured))
    }
}

/// Model response with a single text message
pub fn text_response(text: &str) -> Result<ModelResponse, LlmError> {
    Ok(ModelResponse::new(vec![OutputItem::text(text)]))
}

/// Model response with a single function call
pub fn tool_response(name: &str, arguments: serde_json::Value) -> Result<ModelResponse, LlmError> {
    Ok(ModelResponse::new(vec![OutputItem::function_call(
        "call_1",
        name,
        arguments.to_string(),
    )]))
}

/// Provider failure
pub fn failed_response() -> Result<ModelResponse, LlmError> {
    Err(LlmError::Status {
        status: 500,
        body: "upstream unavailable".to_string(),
    })
}

pub fn bridge_config(timeout: Duration, policy: ReconnectPolicy) -> BridgeConfig {
    BridgeConfig {
        command_timeout: timeout,
        allowed_commands: CommandAllowlist::default(),
        reconnect_policy: policy,
        outbound_buffer: 16,
    }
}

pub fn agent_settings() -> AgentSettings {
    AgentSettings {
        model: "test-model".to_string(),
        history_limit: 10,
        organization_name: "Test Org".to_string(),
        max_output_tokens: None,
    }
}

pub fn test_authenticator() -> Authenticator {
    let tokens = [
        (AGENT_TOKEN.to_string(), "user1".to_string()),
        (REQUESTER_TOKEN.to_string(), "user1".to_string()),
    ]
    .into_iter()
    .collect();
    Authenticator::new(None, tokens)
}

/// Full API state over an in-memory database and a scripted model
pub fn test_state(
    db: DbPool,
    model: Arc<dyn LanguageModel>,
    bridge: BridgeConfig,
) -> Arc<ApiState> {
    build_state(
        db,
        model,
        true,
        BridgeParts {
            api_key: Some(TEST_API_KEY.to_string().into()),
            authenticator: test_authenticator(),
            settings: agent_settings(),
            bridge,
        },
    )
}

/// Frames pushed to a connection registered without a real socket
pub struct FakeConnection {
    pub connection: Connection,
    pub frames: mpsc::Receiver<ServerFrame>,
}

/// Register a socketless connection for `identity`
pub async fn connect(registry: &SharedConnectionRegistry, identity: Identity) -> FakeConnection {
    let (tx, frames) = mpsc::channel(16);
    let connection = Connection::new(identity, tx);
    registry.register(connection.clone()).await;
    FakeConnection { connection, frames }
}

/// Spawn a desktop agent that answers every command with `reply`
///
/// `reply` returns `None` to leave a command unanswered.
pub async fn spawn_agent<F>(
    registry: &SharedConnectionRegistry,
    channel: Arc<WsCommandChannel>,
    subject: &str,
    reply: F,
) -> Connection
where
    F: Fn(&CommandRequest) -> Option<CommandResult> + Send + 'static,
{
    let FakeConnection {
        connection,
        mut frames,
    } = connect(registry, Identity::desktop_agent(subject)).await;

    tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if let ServerFrame::ExecuteCommand(request) = frame
                && let Some(result) = reply(&request)
            {
                channel.deliver(&result);
            }
        }
    });

    connection
}

/// Registry using the default replace policy
pub fn registry() -> SharedConnectionRegistry {
    Arc::new(ConnectionRegistry::new())
}

/// Body of an axum response as JSON
pub async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
