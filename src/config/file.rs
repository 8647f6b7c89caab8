//! TOML configuration file loading
//!
//! Supports `~/.config/helpdesk-bridge/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct BridgeConfigFile {
    #[serde(default)]
    pub server: ServerFileConfig,

    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Remote command dispatch
    #[serde(default)]
    pub bridge: BridgeFileConfig,

    /// Support agent behaviour
    #[serde(default)]
    pub agent: AgentFileConfig,

    /// Handshake credentials
    #[serde(default)]
    pub auth: AuthFileConfig,

    #[serde(default)]
    pub database: DatabaseFileConfig,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,

    /// Key required on `/api/*` routes
    pub api_key: Option<String>,
}

/// LLM provider configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Responses API base URL (e.g. "https://api.openai.com/v1")
    pub base_url: Option<String>,

    pub api_key: Option<String>,

    /// Model identifier (e.g. "gpt-4.1-mini")
    pub model: Option<String>,

    pub request_timeout_secs: Option<u64>,
}

/// Remote command dispatch configuration
#[derive(Debug, Default, Deserialize)]
pub struct BridgeFileConfig {
    pub command_timeout_secs: Option<u64>,

    /// Replaces the built-in allowlist entirely
    pub allowed_commands: Option<Vec<String>>,

    /// "replace" or "reject"
    pub reconnect_policy: Option<String>,

    /// Per-connection outbound frame queue size
    pub outbound_buffer: Option<usize>,
}

/// Support agent configuration
#[derive(Debug, Default, Deserialize)]
pub struct AgentFileConfig {
    /// Conversation turns sent to the model
    pub history_limit: Option<usize>,

    pub organization_name: Option<String>,
}

/// Handshake credential configuration
#[derive(Debug, Default, Deserialize)]
pub struct AuthFileConfig {
    /// HS256 signing secret for handshake JWTs
    pub jwt_secret: Option<String>,

    /// Static tokens: token -> subject
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DatabaseFileConfig {
    pub path: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// A missing file means defaults.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file exists but cannot be read or parsed
pub fn load_config_file() -> Result<BridgeConfigFile> {
    match config_file_path() {
        Some(path) if path.exists() => load_config_from(&path),
        _ => Ok(BridgeConfigFile::default()),
    }
}

/// Load a TOML config file from an explicit path
///
/// # Errors
///
/// Returns [`Error::Config`] if the file is missing, unreadable or malformed
pub fn load_config_from(path: &Path) -> Result<BridgeConfigFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("invalid config file {}: {e}", path.display())))?;

    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/helpdesk-bridge/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("helpdesk-bridge").join("config.toml"))
}
