//! The tool contract every agent composes with.
//!
//! A tool is a self-describing, stateless-from-the-caller's-perspective unit
//! an agent can call zero or more times; the context carries per-call
//! ambient state (session id, cancellation) without a global singleton.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::cancel::CancellationToken;
use crate::error::Result;

/// Ambient state passed to a [`Tool::execute`] call.
pub trait ToolContext: Send + Sync {
    fn session_id(&self) -> &str;
    fn cancellation(&self) -> &CancellationToken;
}

/// A basic [`ToolContext`] sufficient for direct tool use outside an agent
/// loop (e.g. the RAG agent's own `search_documents` tool).
pub struct SimpleToolContext {
    session_id: String,
    cancellation: CancellationToken,
}

impl SimpleToolContext {
    pub fn new(session_id: impl Into<String>, cancellation: CancellationToken) -> Self {
        Self { session_id: session_id.into(), cancellation }
    }
}

impl ToolContext for SimpleToolContext {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

/// A callable the LLM can invoke during a reasoning loop.
///
/// Implementations describe themselves (`name`, `description`,
/// `parameters_schema`) so an agent can present a uniform tool catalog to
/// the LLM regardless of whether the tool wraps retrieval, an MCP server,
/// or a local analytics toolkit.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable, LLM-facing tool name.
    fn name(&self) -> &str;

    /// Human-readable description shown to the LLM.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's arguments, if any.
    fn parameters_schema(&self) -> Option<Value> {
        None
    }

    /// JSON Schema for the tool's response, if known.
    fn response_schema(&self) -> Option<Value> {
        None
    }

    /// Whether this tool's execution may run long enough that the agent
    /// loop should treat it as a distinct, cancellable unit of work.
    fn is_long_running(&self) -> bool {
        false
    }

    /// Invoke the tool with the given arguments.
    async fn execute(&self, ctx: Arc<dyn ToolContext>, args: Value) -> Result<Value>;
}

/// A named group of [`Tool`]s resolved lazily (e.g. an MCP server's catalog,
/// discovered once at construction time and reused for every call).
#[async_trait]
pub trait Toolset: Send + Sync {
    fn name(&self) -> &str;

    async fn tools(&self) -> Result<Vec<Arc<dyn Tool>>>;
}
