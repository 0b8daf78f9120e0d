//! Error types for the `sable-agent` crate.
//!
//! These only surface from constructors (e.g. an MCP agent failing to list
//! tools at startup). A running agent's `execute` never returns a
//! `Result`; failures there become an `AgentErrorKind` on the
//! `AgentResult` (§9 "exceptions as orchestrator control flow").

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentBuildError {
    #[error("failed to enumerate tools: {0}")]
    ToolDiscovery(String),

    #[error(transparent)]
    Core(#[from] sable_core::SableError),
}

pub type Result<T> = std::result::Result<T, AgentBuildError>;
