//! Error types for the `sable-orchestrator` crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// No agents are registered at all (§7 B3: "Orchestrator with zero
    /// enabled agents returns a structured 'no-agent' error, not a crash").
    #[error("no agents are registered with the orchestrator")]
    NoAgents,

    #[error(transparent)]
    Core(#[from] sable_core::SableError),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
