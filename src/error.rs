//! Error types for the helpdesk bridge

use thiserror::Error;

use crate::llm::LlmError;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the bridge library
///
/// Dispatch failures are not listed here: they are values the tool layer
/// renders for the model (see [`crate::dispatch::DispatchError`]).
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or unusable configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Primary model call failed
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection pool exhausted or unable to open the ticket store
    #[error("ticket store unavailable: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored row could not be mapped back to a domain value
    #[error("corrupt ticket data: {0}")]
    Corrupt(String),

    /// Unknown ticket or other addressed resource
    #[error("not found: {0}")]
    NotFound(String),
}
