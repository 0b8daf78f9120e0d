//! RAG, MCP, and specialized analytics agents built on the `sable-core`
//! agent contract. Every agent here is a tool-using agent over the shared
//! bounded reasoning loop in [`reasoning`].

pub mod error;
pub mod mcp;
pub mod rag;
pub mod reasoning;
pub mod specialized;

pub use error::{AgentBuildError, Result};
pub use mcp::McpAgent;
pub use rag::RagAgent;
pub use reasoning::{run_tool_loop, LoopLimits, LoopOutcome};
pub use specialized::{file_agent, pandas_agent, python_agent, sql_agent, ToolsetAgent};
