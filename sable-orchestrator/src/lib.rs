//! Hybrid agent analyzer, execution-strategy orchestrator, and chat mode
//! router — the multi-agent control flow that sits above `sable-agent`.

pub mod analyzer;
pub mod error;
pub mod orchestrator;
pub mod router;

pub use analyzer::{CandidateScore, HybridAnalyzer, AGENT_PRIORITY};
pub use error::{OrchestratorError, Result};
pub use orchestrator::Orchestrator;
pub use router::{ChatMode, ChatModeRouter};
