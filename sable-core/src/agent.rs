//! The base agent contract (C9).
//!
//! Every agent — RAG, MCP, Pandas, SQL, Python, File — implements [`Agent`].
//! `execute` never raises: failures are recorded as an [`AgentErrorKind`]
//! inside the returned [`AgentResult`] so the orchestrator can compose
//! results with `Result<Output, AgentError>`-style reasoning without ever
//! needing to catch a panic or propagated error from an agent (design note:
//! "Exceptions as orchestrator control flow" → typed result at the boundary).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::chat::ChatMessage;
use crate::usage::{TokenSink, TokenUsage};

/// A conjunction of metadata predicates applied before ranking (§4.2).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub predicates: Vec<FilterPredicate>,
}

/// A single metadata predicate: either exact equality or tag-set membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterPredicate {
    Eq { key: String, value: String },
    Contains { key: String, value: String },
}

impl MetadataFilter {
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { predicates: vec![FilterPredicate::Eq { key: key.into(), value: value.into() }] }
    }

    pub fn and_eq(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.predicates.push(FilterPredicate::Eq { key: key.into(), value: value.into() });
        self
    }

    pub fn and_contains(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.predicates.push(FilterPredicate::Contains { key: key.into(), value: value.into() });
        self
    }

    /// Evaluate the filter's conjunction against one chunk's metadata.
    pub fn matches(&self, metadata: &HashMap<String, String>) -> bool {
        self.predicates.iter().all(|p| match p {
            FilterPredicate::Eq { key, value } => metadata.get(key).is_some_and(|v| v == value),
            FilterPredicate::Contains { key, value } => {
                metadata.get(key).is_some_and(|v| v.split(',').any(|t| t.trim() == value))
            }
        })
    }
}

/// The execution strategy for a turn (§4.11). Re-exported by
/// `sable-orchestrator`; lives here because [`Query`] carries an optional
/// hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStrategy {
    Sequential,
    Parallel,
    Conditional,
    Hybrid,
}

/// An immutable request for one turn (§3 data model).
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub session_id: String,
    pub history: Vec<ChatMessage>,
    pub topic_filter: Option<String>,
    pub metadata_filter: Option<MetadataFilter>,
    pub strategy_hint: Option<ExecutionStrategy>,
}

impl Query {
    pub fn new(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            session_id: session_id.into(),
            history: Vec::new(),
            topic_filter: None,
            metadata_filter: None,
            strategy_hint: None,
        }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic_filter = Some(topic.into());
        self
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.metadata_filter = Some(filter);
        self
    }

    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy_hint = Some(strategy);
        self
    }
}

/// Why an agent failed to produce a usable result (§7, AgentError kinds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentErrorKind {
    Timeout,
    ToolFailure(String),
    LlmFailure(String),
    Retrieval(String),
    Internal(String),
}

impl std::fmt::Display for AgentErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentErrorKind::Timeout => write!(f, "agent timed out"),
            AgentErrorKind::ToolFailure(m) => write!(f, "tool failure: {m}"),
            AgentErrorKind::LlmFailure(m) => write!(f, "llm failure: {m}"),
            AgentErrorKind::Retrieval(m) => write!(f, "retrieval failure: {m}"),
            AgentErrorKind::Internal(m) => write!(f, "internal error: {m}"),
        }
    }
}

/// The outcome of one agent's `execute` call (§3 data model).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_name: String,
    pub output: String,
    pub used_tools: Vec<String>,
    pub usage: TokenUsage,
    pub error: Option<AgentErrorKind>,
    pub duration: Duration,
}

impl AgentResult {
    pub fn ok(agent_name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            output: output.into(),
            used_tools: Vec::new(),
            usage: TokenUsage::default(),
            error: None,
            duration: Duration::ZERO,
        }
    }

    pub fn failed(agent_name: impl Into<String>, error: AgentErrorKind) -> Self {
        Self {
            agent_name: agent_name.into(),
            output: String::new(),
            used_tools: Vec::new(),
            usage: TokenUsage::default(),
            error: Some(error),
            duration: Duration::ZERO,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.used_tools = tools;
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Ambient state passed to every agent invocation.
///
/// Constructed once per turn by the orchestrator and handed to every
/// candidate agent; no agent reaches for a process-wide singleton.
#[derive(Clone)]
pub struct AgentContext {
    pub token_sink: Arc<dyn TokenSink>,
    pub cancellation: CancellationToken,
    pub model: String,
    /// The chat mode (`simple`/`tool`/`rag`) this turn is running under, set
    /// by the chat mode router so token usage can be broken down by mode.
    pub mode: Option<String>,
}

impl AgentContext {
    pub fn new(token_sink: Arc<dyn TokenSink>, cancellation: CancellationToken, model: impl Into<String>) -> Self {
        Self { token_sink, cancellation, model: model.into(), mode: None }
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }
}

/// The contract every agent implements.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable identifier used for tie-breaks, token-tracking breakdowns, and
    /// orchestrator logging.
    fn name(&self) -> &str;

    /// Human-readable description used by the hybrid analyzer's selection
    /// prompt.
    fn description(&self) -> &str;

    /// Answer `query`. Must never panic or propagate an error: trap
    /// failures into `AgentResult.error`.
    async fn execute(&self, query: &Query, ctx: Arc<AgentContext>) -> AgentResult;
}
