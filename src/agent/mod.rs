//! Support agent turn: prompt, model call, tools, summary

pub mod orchestrator;
pub mod prompt;
pub mod summarizer;

pub use orchestrator::{
    AgentReply, AgentSettings, EMPTY_REPLY_FALLBACK, GENERIC_FAILURE_REPLY, Orchestrator,
};
pub use summarizer::ResultSummarizer;
