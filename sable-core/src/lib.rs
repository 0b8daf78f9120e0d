//! Shared traits, error kinds, and context types for the Sable RAG and
//! multi-agent orchestration core.
//!
//! This crate defines the seams other crates in the workspace build
//! against: the [`Agent`] and [`Tool`] contracts, the external
//! collaborator interfaces the core consumes (§6), and the value types
//! (queries, results, token usage) that cross those seams. It has no
//! runtime behavior of its own.

pub mod agent;
pub mod cancel;
pub mod chat;
pub mod config;
pub mod error;
pub mod interfaces;
pub mod tool;
pub mod usage;

pub use agent::{
    Agent, AgentContext, AgentErrorKind, AgentResult, ExecutionStrategy, FilterPredicate,
    MetadataFilter, Query,
};
pub use cancel::CancellationToken;
pub use chat::{ChatMessage, Role, ToolCall, ToolDescriptor};
pub use config::{
    ChunkingConfig, CoreConfig, CoreConfigBuilder, EmbeddingConfig, OrchestratorConfig,
    RerankerConfig, RetrievalConfig, TokensConfig,
};
pub use error::{Result, SableError};
pub use interfaces::{ChatHistoryStore, Clock, KeyManager, LlmProvider, LlmResponse, McpToolCatalog, SystemClock};
pub use tool::{SimpleToolContext, Tool, ToolContext, Toolset};
pub use usage::{NullTokenSink, TokenSink, TokenUsage, TokenUsageEvent};
