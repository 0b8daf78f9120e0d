//! Shared error kind for the Sable core.
//!
//! Downstream crates define their own `thiserror` enums and wrap this one
//! with `#[error(transparent)]` / `#[from]`.

use thiserror::Error;

/// Errors shared across crate boundaries.
///
/// This is intentionally narrow: component-specific failure detail (timeout
/// vs. tool failure vs. LLM failure, etc.) lives in each crate's own error
/// enum; this type only names the kind, not the full detail.
#[derive(Debug, Error)]
pub enum SableError {
    /// Missing config key, invalid value, or an unresolvable model id.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A tool invocation failed (missing args, transport error, bad response).
    #[error("tool error: {0}")]
    Tool(String),

    /// An agent-level failure that could not be trapped closer to the source.
    #[error("agent error: {0}")]
    Agent(String),

    /// An LLM provider call failed.
    #[error("llm provider error: {0}")]
    Llm(String),

    /// Decryption failure or vector-store integrity failure.
    #[error("corruption error: {0}")]
    Corruption(String),

    /// JSON (de)serialization failure.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Filesystem I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience result alias for `sable-core` consumers.
pub type Result<T> = std::result::Result<T, SableError>;
