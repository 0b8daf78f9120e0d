//! Token usage value types shared between the LLM provider interface, the
//! agent contract, and the token tracker.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The token cost of a single LLM call, as reported by a provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn combine(&self, other: &TokenUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens + other.input_tokens,
            output_tokens: self.output_tokens + other.output_tokens,
        }
    }
}

/// One `record()` call's worth of usage, as reported by an agent or the
/// chat-mode router to a [`TokenSink`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsageEvent {
    pub model: String,
    pub agent: Option<String>,
    /// The chat mode (`simple`/`tool`/`rag`) this usage was incurred under.
    #[serde(default)]
    pub mode: Option<String>,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub duration: Duration,
    pub tools: Vec<String>,
    #[serde(default)]
    pub extra: Value,
}

/// A handle opened for the duration of one turn. Every component that
/// contributes token usage during that turn records against it.
///
/// Implemented by `sable-tokens::TokenTracker`'s handle type; defined here
/// so `sable-agent` and `sable-orchestrator` can depend on the contract
/// without depending on the tracker's storage implementation (no
/// process-wide singleton is threaded through; the handle is passed
/// explicitly via `AgentContext`).
pub trait TokenSink: Send + Sync {
    fn record(&self, event: TokenUsageEvent);
}

/// A [`TokenSink`] that discards every event. Used when a caller invokes an
/// agent or pipeline outside of the orchestrator's turn bookkeeping (tests,
/// `search()`-only callers).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTokenSink;

impl TokenSink for NullTokenSink {
    fn record(&self, _event: TokenUsageEvent) {}
}
