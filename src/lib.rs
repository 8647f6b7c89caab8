//! Helpdesk Bridge - remote diagnostics for an LLM support agent
//!
//! This library provides the pieces of a human-in-the-loop helpdesk:
//! - A registry of live desktop-agent and requester WebSocket connections
//! - An allowlisted command dispatcher with per-call timeouts
//! - A tool-call interpreter and result summarizer around a language model
//! - An orchestrator that answers ticket messages end to end
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │            Helpdesk frontend / operators             │
//! │       POST /api/ai/respond  │  /api/connections      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Helpdesk Bridge                     │
//! │  Orchestrator │ Interpreter │ Dispatcher │ Registry  │
//! └──────────┬─────────────────────────────┬────────────┘
//!            │                             │ /ws/agent
//! ┌──────────▼──────────┐      ┌───────────▼────────────┐
//! │   Language model    │      │    Desktop agents      │
//! │  (Responses API)    │      │  (allowlisted commands) │
//! └─────────────────────┘      └────────────────────────┘
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod connections;
pub mod daemon;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod llm;
pub mod security;
pub mod tickets;
pub mod tools;

pub use config::Config;
pub use daemon::Daemon;
pub use db::{DbConn, DbPool};
pub use error::{Error, Result};
