//! Configuration management for the helpdesk bridge
//!
//! Values resolve as env > TOML file > defaults.

pub mod file;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::connections::ReconnectPolicy;
use crate::dispatch::{CommandAllowlist, DEFAULT_COMMAND_TIMEOUT};
use crate::llm::DEFAULT_BASE_URL;
use crate::{Error, Result};

use file::BridgeConfigFile;

/// Default API server port
pub const DEFAULT_PORT: u16 = 18790;

/// Default model identifier
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Default number of conversation turns sent to the model
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Helpdesk bridge configuration
#[derive(Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub bridge: BridgeConfig,
    pub agent: AgentConfig,
    pub auth: AuthSettings,

    /// `SQLite` database file
    pub database_path: PathBuf,
}

/// HTTP API server configuration
#[derive(Debug)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// API key for `/api/*` routes (from `HELPDESK_API_KEY` env)
    pub api_key: Option<SecretString>,
}

/// Language model configuration
#[derive(Debug)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub request_timeout: Duration,
}

/// Remote command dispatch configuration
#[derive(Debug)]
pub struct BridgeConfig {
    /// Bound on every dispatched command
    pub command_timeout: Duration,

    /// Exact-match command allowlist, fixed for the process lifetime
    pub allowed_commands: CommandAllowlist,

    /// What happens when an online identity connects again
    pub reconnect_policy: ReconnectPolicy,

    /// Outbound frame queue size per connection
    pub outbound_buffer: usize,
}

/// Support agent configuration
#[derive(Debug)]
pub struct AgentConfig {
    pub history_limit: usize,

    /// Shown to the model in the instructions
    pub organization_name: String,
}

/// Handshake credential configuration
pub struct AuthSettings {
    pub jwt_secret: Option<SecretString>,

    /// Static tokens: token -> subject
    pub tokens: HashMap<String, String>,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut subjects: Vec<&str> = self.tokens.values().map(String::as_str).collect();
        subjects.sort_unstable();
        f.debug_struct("AuthSettings")
            .field("jwt_secret", &self.jwt_secret)
            .field("token_subjects", &subjects)
            .finish()
    }
}

impl Config {
    /// Load configuration from the process environment and the default config file
    ///
    /// # Errors
    ///
    /// Returns error if the config file is malformed or a configured value is
    /// invalid
    pub fn load() -> Result<Self> {
        Self::resolve(file::load_config_file()?, |key| std::env::var(key).ok())
    }

    /// Load configuration using an explicit config file path
    ///
    /// # Errors
    ///
    /// Returns error if the file is missing or malformed, or a configured
    /// value is invalid
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::resolve(file::load_config_from(path)?, |key| std::env::var(key).ok())
    }

    /// Layer an environment lookup over a parsed config file
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn resolve<F>(fc: BridgeConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_env = |key: &str| -> Result<Option<u64>> {
            env(key)
                .map(|v| {
                    v.parse::<u64>()
                        .map_err(|_| Error::Config(format!("{key} must be a number, got '{v}'")))
                })
                .transpose()
        };

        // Server (env > toml > default)
        let port = match env("HELPDESK_PORT").or_else(|| env("PORT")) {
            Some(v) => v
                .parse()
                .map_err(|_| Error::Config(format!("invalid port '{v}'")))?,
            None => fc.server.port.unwrap_or(DEFAULT_PORT),
        };
        let server = ServerConfig {
            port,
            api_key: secret(env("HELPDESK_API_KEY").or(fc.server.api_key)),
        };

        // LLM (env > toml > default)
        let llm = LlmConfig {
            base_url: env("OPENAI_BASE_URL")
                .or(fc.llm.base_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: secret(env("OPENAI_API_KEY").or(fc.llm.api_key)),
            model: env("HELPDESK_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            request_timeout: Duration::from_secs(fc.llm.request_timeout_secs.unwrap_or(60)),
        };

        // Bridge (env > toml > default)
        let command_timeout = parse_env("HELPDESK_COMMAND_TIMEOUT_SECS")?
            .or(fc.bridge.command_timeout_secs)
            .map_or(DEFAULT_COMMAND_TIMEOUT, Duration::from_secs);
        if command_timeout.is_zero() {
            return Err(Error::Config("command timeout must be positive".to_string()));
        }

        let reconnect_policy = match env("HELPDESK_RECONNECT_POLICY").or(fc.bridge.reconnect_policy) {
            Some(v) => ReconnectPolicy::parse(&v)
                .ok_or_else(|| Error::Config(format!("unknown reconnect policy '{v}'")))?,
            None => ReconnectPolicy::default(),
        };

        let allowed_commands = fc
            .bridge
            .allowed_commands
            .map_or_else(CommandAllowlist::default, CommandAllowlist::from_commands);
        if allowed_commands.is_empty() {
            return Err(Error::Config("allowed_commands must not be empty".to_string()));
        }

        let bridge = BridgeConfig {
            command_timeout,
            allowed_commands,
            reconnect_policy,
            outbound_buffer: fc.bridge.outbound_buffer.unwrap_or(64).max(1),
        };

        // Agent (env > toml > default)
        let history_limit = parse_env("HELPDESK_HISTORY_LIMIT")?
            .and_then(|v| usize::try_from(v).ok())
            .or(fc.agent.history_limit)
            .unwrap_or(DEFAULT_HISTORY_LIMIT);
        if history_limit == 0 {
            return Err(Error::Config("history limit must be at least 1".to_string()));
        }
        let agent = AgentConfig {
            history_limit,
            organization_name: env("HELPDESK_ORGANIZATION")
                .or(fc.agent.organization_name)
                .unwrap_or_else(|| "the organization".to_string()),
        };

        let auth = AuthSettings {
            jwt_secret: secret(env("HELPDESK_JWT_SECRET").or(fc.auth.jwt_secret)),
            tokens: fc.auth.tokens,
        };

        // Determine data directory (~/.local/share/helpdesk-bridge on Linux)
        let data_dir = directories::BaseDirs::new()
            .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("helpdesk-bridge"));
        let database_path = env("HELPDESK_DB_PATH")
            .or(fc.database.path)
            .map_or_else(|| data_dir.join("bridge.db"), PathBuf::from);

        Ok(Self {
            server,
            llm,
            bridge,
            agent,
            auth,
            database_path,
        })
    }
}

fn secret(value: Option<String>) -> Option<SecretString> {
    value.filter(|v| !v.is_empty()).map(SecretString::from)
}
